//! Property-based tests for `ConfigStore` dump/load.
//!
//! Uses proptest to generate arbitrary realms and values and verify the
//! round-trip invariant holds, not just for the handful of example stores
//! exercised by the crate's unit tests.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use nsis_config::{ConfigStore, ConfigValue};
use proptest::prelude::*;

fn arbitrary_addr() -> impl Strategy<Value = IpAddr> {
    prop_oneof![
        any::<u32>().prop_map(|v| IpAddr::V4(Ipv4Addr::from(v))),
        any::<u128>().prop_map(|v| IpAddr::V6(Ipv6Addr::from(v))),
    ]
}

fn arbitrary_value() -> impl Strategy<Value = ConfigValue> {
    prop_oneof![
        any::<bool>().prop_map(ConfigValue::Bool),
        any::<u64>().prop_map(ConfigValue::U64),
        any::<f64>().prop_filter("finite", |f| f.is_finite()).prop_map(ConfigValue::F64),
        "[a-zA-Z0-9_]{0,16}".prop_map(ConfigValue::Str),
        arbitrary_addr().prop_map(ConfigValue::Addr),
        prop::collection::vec(arbitrary_addr(), 0..4).prop_map(ConfigValue::AddrList),
    ]
}

fn arbitrary_store() -> impl Strategy<Value = ConfigStore> {
    prop::collection::vec(
        ("[a-z]{1,8}", prop::collection::vec(("[a-z_]{1,8}", arbitrary_value()), 0..6)),
        0..4,
    )
    .prop_map(|realms| {
        let mut store = ConfigStore::new();
        for (realm_name, entries) in realms {
            let realm = store.realm_mut(&realm_name);
            for (key, value) in entries {
                realm.set(key, value);
            }
        }
        store
    })
}

proptest! {
    #[test]
    fn dump_load_round_trips_for_any_store(store in arbitrary_store()) {
        let dumped = store.dump().expect("dump never fails for a well-formed store");
        let reloaded = ConfigStore::load(&dumped).expect("load is dump's exact inverse");
        prop_assert_eq!(&store, &reloaded);
        prop_assert_eq!(dumped, reloaded.dump().expect("reloaded store dumps identically"));
    }
}
