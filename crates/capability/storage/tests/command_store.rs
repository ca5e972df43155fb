use pmac_storage::{CommandStore, StoreError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn store_with(names: &[&str]) -> CommandStore {
    let mut store = CommandStore::new();
    for name in names {
        store.add_item(name);
    }
    store
}

#[test]
fn combined_command_preserves_order() {
    let mut store = store_with(&["A", "B", "C"]);
    assert_eq!(store.build_command(), "A B C");
    assert_eq!(store.update_reply("1\r2\r3\r"), Ok(3));
    assert_eq!(store.read_value("B"), "2");
}

#[test]
fn ack_after_last_cr_is_not_a_value() {
    let mut store = store_with(&["M100", "&2Q87"]);
    assert_eq!(store.update_reply("5\r-1.25\r\u{6}"), Ok(2));
    assert_eq!(store.read_value("&2Q87"), "-1.25");
}

#[test]
fn short_reply_updates_prefix_and_reports_mismatch() {
    let mut store = store_with(&["A", "B", "C"]);
    store.update_reply("1\r2\r3\r").unwrap();

    let result = store.update_reply("10\r");
    assert_eq!(
        result,
        Err(StoreError::ProtocolMismatch {
            expected: 3,
            received: 1,
            updated: 1
        })
    );
    assert_eq!(store.read_value("A"), "10");
    assert_eq!(store.read_value("B"), "2");
    assert_eq!(store.read_value("C"), "3");
}

#[test]
fn long_reply_consumes_only_registered_count() {
    let mut store = store_with(&["A", "B"]);
    let result = store.update_reply("1\r2\r3\r4\r");
    assert_eq!(
        result,
        Err(StoreError::ProtocolMismatch {
            expected: 2,
            received: 4,
            updated: 2
        })
    );
    assert_eq!(store.read_value("A"), "1");
    assert_eq!(store.read_value("B"), "2");
}

#[test]
fn random_values_round_trip() {
    let mut rng = StdRng::seed_from_u64(0x9a7c);
    for _ in 0..50 {
        let count = rng.gen_range(1..120);
        let mut store = CommandStore::new();
        let names: Vec<String> = (0..count).map(|i| format!("M{}", i * 7)).collect();
        for name in &names {
            store.add_item(name);
        }
        let values: Vec<String> = (0..count)
            .map(|_| rng.gen_range(-100_000i64..100_000).to_string())
            .collect();

        let mut reply = String::new();
        for value in &values {
            reply.push_str(value);
            reply.push('\r');
        }
        assert_eq!(store.update_reply(&reply), Ok(count));
        for (name, value) in names.iter().zip(&values) {
            assert_eq!(store.read_value(name), value);
        }
    }
}

#[test]
fn chunked_commands_cover_every_name_once() {
    let names: Vec<String> = (0..97).map(|i| format!("I{}", i)).collect();
    let mut store = CommandStore::new();
    for name in &names {
        store.add_item(name);
    }
    let joined: Vec<String> = store
        .command_strings()
        .iter()
        .flat_map(|command| command.split(' ').map(str::to_string))
        .collect();
    assert_eq!(joined, names);

    for command in store.command_strings().to_vec() {
        let reply: String = command.split(' ').map(|name| format!("{}v\r", name)).collect();
        store.update_chunk(&command, &reply).unwrap();
    }
    assert_eq!(store.read_value("I96"), "I96v");
}
