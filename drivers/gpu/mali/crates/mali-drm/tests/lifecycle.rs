//! Driver load, client open/close and device teardown

use std::sync::Arc;
use std::thread;

use mali_core::PoolId;
use mali_drm::{nr, AccessFlags, Driver, DriverConfig, DrmFile, Error, MaliFb, MaliMem};

fn loaded(video: u64, general: u64) -> (Driver, DrmFile) {
    let driver = Driver::load(DriverConfig::default());
    let master = driver.open(AccessFlags::AUTH | AccessFlags::MASTER | AccessFlags::ROOT_ONLY);

    let mut fb = bytemuck::bytes_of(&MaliFb { offset: 0, size: video }).to_vec();
    driver.ioctl(&master, nr::FB_INIT, &mut fb).unwrap();
    let mut mem = bytemuck::bytes_of(&MaliMem::for_init(0, general)).to_vec();
    driver.ioctl(&master, nr::MEM_INIT, &mut mem).unwrap();

    (driver, master)
}

fn alloc(driver: &Driver, file: &DrmFile, request: u32, size: u64) -> Result<MaliMem, Error> {
    let mut payload = bytemuck::bytes_of(&MaliMem::for_alloc(size)).to_vec();
    driver.ioctl(file, request, &mut payload)?;
    Ok(bytemuck::pod_read_unaligned(&payload))
}

fn free(driver: &Driver, file: &DrmFile, handle: u64) -> Result<(), Error> {
    let mut payload = bytemuck::bytes_of(&MaliMem::for_free(handle)).to_vec();
    driver.ioctl(file, nr::MEM_FREE, &mut payload)
}

#[test]
fn closing_a_file_reclaims_its_buffers() {
    let (driver, _master) = loaded(4096, 4096);
    let a = driver.open(AccessFlags::AUTH);
    let b = driver.open(AccessFlags::AUTH);

    let mut handles = Vec::new();
    for i in 0..6 {
        let request = if i % 2 == 0 { nr::FB_ALLOC } else { nr::MEM_ALLOC };
        handles.push(alloc(&driver, &a, request, 64 + i).unwrap().free);
    }
    let kept = alloc(&driver, &b, nr::MEM_ALLOC, 64).unwrap();
    assert_eq!(driver.memory().live_handles(), 7);

    driver.release(a);

    assert_eq!(driver.memory().live_handles(), 1);
    assert_eq!(driver.pool_info(PoolId::Video).free.as_bytes(), 4096);
    assert_eq!(driver.pool_info(PoolId::General).free.as_bytes(), 4096 - 64);
    for handle in handles {
        assert_eq!(free(&driver, &b, handle), Err(Error::InvalidHandle));
    }
    assert_eq!(free(&driver, &b, kept.free), Ok(()));
}

#[test]
fn handle_is_invalid_after_disconnect() {
    let (driver, _master) = loaded(1024, 1024);
    let client = driver.open(AccessFlags::AUTH);
    let other = driver.open(AccessFlags::AUTH);

    let h = alloc(&driver, &client, nr::MEM_ALLOC, 128).unwrap().free;
    driver.release(client);

    assert_eq!(free(&driver, &other, h), Err(Error::InvalidHandle));
}

#[test]
fn closing_an_idle_file_is_harmless() {
    let (driver, _master) = loaded(1024, 1024);
    let idle = driver.open(AccessFlags::AUTH);
    driver.preclose(&idle);
    driver.release(idle);
    assert!(driver.memory().is_initialized(PoolId::Video));
}

#[test]
fn last_close_tears_the_device_down() {
    let (driver, master) = loaded(1024, 1024);
    let client = driver.open(AccessFlags::AUTH);
    alloc(&driver, &client, nr::FB_ALLOC, 64).unwrap();
    assert_eq!(driver.open_files(), 2);

    driver.release(client);
    assert!(driver.memory().is_initialized(PoolId::Video));

    driver.release(master);
    assert_eq!(driver.open_files(), 0);
    assert!(!driver.memory().is_initialized(PoolId::Video));
    assert!(!driver.memory().is_initialized(PoolId::General));

    let late = driver.open(AccessFlags::AUTH);
    assert_eq!(
        alloc(&driver, &late, nr::FB_ALLOC, 64),
        Err(Error::PoolNotInitialized)
    );
    driver.release(late);
    driver.unload();
}

#[test]
fn fault_flag_is_visible_through_dma_quiescent() {
    let (driver, _master) = loaded(1024, 1024);
    assert!(driver.dma_quiescent());

    let client = driver.open(AccessFlags::AUTH);
    alloc(&driver, &client, nr::MEM_ALLOC, 64).unwrap();

    driver.set_idle_fault(true);
    assert!(!driver.dma_quiescent());

    // Reclaim still goes ahead on a faulted device
    driver.release(client);
    assert_eq!(driver.memory().live_handles(), 0);

    driver.lastclose();
    assert!(driver.dma_quiescent());
}

#[test]
fn reinit_keeps_orphaned_handles_freeable() {
    let (driver, master) = loaded(1024, 1024);
    let client = driver.open(AccessFlags::AUTH);
    let old = alloc(&driver, &client, nr::MEM_ALLOC, 256).unwrap();

    let mut mem = bytemuck::bytes_of(&MaliMem::for_init(0x10_0000, 2048)).to_vec();
    driver.ioctl(&master, nr::MEM_INIT, &mut mem).unwrap();

    let info = driver.pool_info(PoolId::General);
    assert_eq!(info.capacity.as_bytes(), 2048);
    assert_eq!(info.free.as_bytes(), 2048);

    let new = alloc(&driver, &client, nr::MEM_ALLOC, 256).unwrap();
    assert_eq!(new.offset, 0x10_0000);
    assert_ne!(new.free, old.free);

    assert_eq!(free(&driver, &client, old.free), Ok(()));
    assert_eq!(driver.pool_info(PoolId::General).free.as_bytes(), 2048 - 256);
}

#[test]
fn init_capacity_truncates_to_whole_units() {
    let (driver, _master) = loaded(1000, 31);
    assert_eq!(driver.pool_info(PoolId::Video).capacity.as_bytes(), 992);
    assert_eq!(driver.pool_info(PoolId::General).capacity.as_bytes(), 16);
}

#[test]
fn concurrent_clients() {
    let (driver, _master) = loaded(256 * 1024, 256 * 1024);
    let driver = Arc::new(driver);

    let workers: Vec<_> = (0..8u64)
        .map(|t| {
            let driver = Arc::clone(&driver);
            thread::spawn(move || {
                let file = driver.open(AccessFlags::AUTH);
                let mut live = Vec::new();
                for i in 0..200u64 {
                    let request = if (i + t) % 2 == 0 { nr::FB_ALLOC } else { nr::MEM_ALLOC };
                    if let Ok(mem) = alloc(&driver, &file, request, 16 + (i * 37 + t) % 512) {
                        live.push(mem);
                    }
                    if i % 3 == 2 && !live.is_empty() {
                        let mem = live.remove(0);
                        free(&driver, &file, mem.free).unwrap();
                    }
                }
                let snapshot = live.clone();
                driver.release(file);
                snapshot
            })
        })
        .collect();

    let mut seen = Vec::new();
    for worker in workers {
        seen.extend(worker.join().unwrap());
    }

    assert!(!seen.is_empty());
    assert_eq!(driver.memory().live_handles(), 0);
    assert_eq!(driver.pool_info(PoolId::Video).free.as_bytes(), 256 * 1024);
    assert_eq!(driver.pool_info(PoolId::General).free.as_bytes(), 256 * 1024);
}
