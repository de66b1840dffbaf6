//! Concurrent use of the shared session cache.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rustls::server::StoresServerSessions;
use tls_netlayer::SessionCache;

const THREADS: usize = 8;
const PER_THREAD: usize = 200;

fn session_id(thread: usize, n: usize) -> Vec<u8> {
    format!("session-{thread}-{n}").into_bytes()
}

#[test]
fn test_concurrent_stores_are_all_retrievable() {
    let cache = Arc::new(SessionCache::new(THREADS * PER_THREAD, Duration::from_secs(60)));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for n in 0..PER_THREAD {
                    let payload = vec![t as u8; n + 1];
                    assert!(StoresServerSessions::put(&*cache, session_id(t, n), payload));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.len(), THREADS * PER_THREAD);
    for t in 0..THREADS {
        for n in 0..PER_THREAD {
            assert_eq!(cache.get(&session_id(t, n)), Some(vec![t as u8; n + 1]));
        }
    }
    assert_eq!(cache.stats().evictions, 0);
}

#[test]
fn test_concurrent_overflow_respects_capacity() {
    let capacity = 64;
    let cache = Arc::new(SessionCache::new(capacity, Duration::from_secs(60)));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for n in 0..PER_THREAD {
                    cache.put(session_id(t, n), vec![0u8; 16]);
                    // Readers race the writers; a hit must carry the stored payload.
                    if let Some(value) = cache.get(&session_id(t, n)) {
                        assert_eq!(value.len(), 16);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.len(), capacity);
    assert_eq!(cache.stats().evictions as usize, THREADS * PER_THREAD - capacity);
}
