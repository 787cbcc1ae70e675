mod common;

use numadht::{Config, Context, Dht, IdentityPrehash, IntDht, Placement, VarDht};
use numadht_epoch::advances;

/// Run `f` and return how many times the current thread advanced.
fn counted<R>(f: impl FnOnce() -> R) -> (u64, R) {
    let before = advances();
    let r = f();
    (advances() - before, r)
}

#[test]
fn test_one_advance_per_request() {
    common::init_tracing();
    let dht = IntDht::new();

    assert_eq!(counted(|| dht.put(1, 1).unwrap()).0, 1);
    assert_eq!(counted(|| dht.put(1, 2).unwrap()).0, 1);
    assert_eq!(counted(|| dht.get(1).unwrap()).0, 1);
    assert_eq!(counted(|| dht.get(99).unwrap()).0, 1);
    assert_eq!(counted(|| dht.delete(1).unwrap()).0, 1);
    assert_eq!(counted(|| dht.delete(1).unwrap()).0, 1);

    let mut ctx = Context::new_int(5);
    assert_eq!(counted(|| dht.get_with_context(&mut ctx)).0, 1);
    assert_eq!(counted(|| dht.delete_with_context(&mut ctx)).0, 1);
}

#[test]
fn test_splits_do_not_add_advances() {
    let dht = IntDht::with_config(Config::new().bucket_capacity(1)).unwrap();
    let (n, ()) = counted(|| {
        for k in 0..1_000 {
            dht.put(k, k).unwrap();
        }
    });
    assert!(dht.stats().splits > 0);
    assert_eq!(n, 1_000);
}

#[test]
fn test_var_requests_advance_once() {
    let dht = VarDht::new();
    assert_eq!(counted(|| dht.put(b"a", b"1").unwrap()).0, 1);
    assert_eq!(counted(|| dht.get(b"a", 4).unwrap()).0, 1);
    let mut ctx = Context::new_var(b"a", 4).unwrap();
    assert_eq!(counted(|| dht.get_with_context(&mut ctx)).0, 1);
    assert_eq!(counted(|| dht.delete(b"a").unwrap()).0, 1);
}

#[test]
fn test_exhausted_put_still_advances() {
    let config = Config::new()
        .bucket_capacity(1)
        .max_depth(2)
        .placement(Placement::Single);
    let dht: IntDht<IdentityPrehash> = Dht::with_prehash(config, IdentityPrehash).unwrap();
    dht.put(0, 0).unwrap();
    let (n, res) = counted(|| dht.put(1 << 8, 1));
    assert!(res.is_err());
    assert_eq!(n, 1);
}

#[test]
fn test_alloc_failures_do_not_advance() {
    let dht = IntDht::with_config(Config::new().record_quota(Some(1))).unwrap();
    dht.put(1, 1).unwrap();
    let (n, res) = counted(|| dht.put(2, 2));
    assert!(res.unwrap_err().is_alloc_failure());
    assert_eq!(n, 0);

    let var = VarDht::new();
    let (n, res) = counted(|| var.get(b"k", usize::MAX));
    assert!(res.is_err());
    assert_eq!(n, 0);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_overwrites_are_reclaimed() {
    let dht = IntDht::new();
    let before = numadht_epoch::stats();
    for v in 0..1_000 {
        dht.put(7, v).unwrap();
    }
    let after_puts = numadht_epoch::stats();
    assert!(after_puts.retired >= before.retired + 999);

    // This thread's bag drains once no other thread pins an older epoch.
    assert!(
        common::flush_until(|| numadht_epoch::pending() == 0),
        "{:?}",
        numadht_epoch::stats()
    );
    assert!(numadht_epoch::stats().reclaimed >= before.reclaimed + 999);
    assert_eq!(dht.get(7).unwrap().unwrap().value(), 999);
}
