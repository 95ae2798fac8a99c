#![no_main]

use libfuzzer_sys::fuzz_target;
use replica::ReplicaClient;
use wire::{decode_message, Limits};

fuzz_target!(|data: &[u8]| {
    let limits = Limits::for_testing();

    // A decodable message must also apply cleanly; an undecodable one must
    // leave the mirror untouched.
    let decodable = decode_message(data, &limits).is_ok();
    let mut client = ReplicaClient::new(limits);
    match client.receive(data) {
        Ok(stats) => {
            assert!(decodable);
            assert_eq!(client.object_count(), stats.created - stats.deleted);
        }
        Err(_) => {
            assert!(!decodable);
            assert_eq!(client.object_count(), 0);
        }
    }

    // Fragments of the input are either rejected whole or applied.
    for chunk in data.chunks(64) {
        let _ = client.receive(chunk);
    }
});
