use netuio_abi::{MemRegion, PhysicalAddress, VirtualAddress};
use netuio_eal::ProcessType;
use netuio_eal::memory::{MemConfig, PAGE_SIZE};
use netuio_eal::process::SharedConfig;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn config_file(name: &str, round: usize) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!(
        "netuio-roles-{name}-{round}-{}.config",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    path
}

fn pool() -> MemRegion {
    MemRegion {
        size: 128 * PAGE_SIZE,
        phys_addr: PhysicalAddress::new(0x3_0000_0000),
        virt_addr: VirtualAddress::null(),
        user_mapped_virt_addr: VirtualAddress::new(0x7E00_0000_0000),
    }
}

#[test]
fn racing_openers_elect_exactly_one_primary() {
    for round in 0..8 {
        let path = Arc::new(config_file("race", round));
        let start = Arc::new(Barrier::new(2));

        let contenders: Vec<_> = (0..2)
            .map(|_| {
                let path = Arc::clone(&path);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    let mut shared = SharedConfig::open(&path, ProcessType::Auto, WAIT).unwrap();
                    if shared.role() == ProcessType::Primary {
                        let mut mem = MemConfig::new();
                        mem.store_pool(&pool(), 0).unwrap();
                        shared.publish(&mem).unwrap();
                        shared.mark_complete().unwrap();
                    } else {
                        // the secondary only trusts the region once the marker is set
                        shared.wait_complete(WAIT).unwrap();
                    }
                    let lists = shared.load().unwrap().len();
                    (shared, lists)
                })
            })
            .collect();

        // join both before dropping either, so the primary keeps its lock
        let results: Vec<_> = contenders.into_iter().map(|t| t.join().unwrap()).collect();
        let primaries = results
            .iter()
            .filter(|(shared, _)| shared.role() == ProcessType::Primary)
            .count();

        assert_eq!(primaries, 1, "round {round}");
        assert!(results.iter().all(|(_, lists)| *lists == 1), "round {round}");
    }
}

#[test]
fn secondary_sees_the_published_lists() {
    let path = config_file("publish", 0);
    let mut primary = SharedConfig::open(&path, ProcessType::Auto, WAIT).unwrap();
    let mut mem = MemConfig::new();
    mem.store_pool(&pool(), 1).unwrap();
    primary.publish(&mem).unwrap();

    let waiter = {
        let path = path.clone();
        thread::spawn(move || {
            let mut secondary = SharedConfig::open(&path, ProcessType::Auto, WAIT).unwrap();
            assert_eq!(secondary.role(), ProcessType::Secondary);
            secondary.wait_complete(WAIT).unwrap();
            secondary.load().unwrap()
        })
    };

    thread::sleep(Duration::from_millis(20));
    primary.mark_complete().unwrap();

    let seen = waiter.join().unwrap();
    let list = seen.list(0).unwrap();
    assert_eq!(list.name, "memseg-4k-1-0");
    assert_eq!(list.segs.len(), 128);
    assert_eq!(
        seen.virt_to_iova(VirtualAddress::new(0x7E00_0000_0000 + 3 * PAGE_SIZE + 8)),
        Some(PhysicalAddress::new(0x3_0000_0000 + 3 * PAGE_SIZE + 8))
    );
}
