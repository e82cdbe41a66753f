//! Release queue behavior across threads

use std::sync::Arc;
use std::thread;

use covpath_gpu::interop::{ContextId, ReleaseQueue};

#[test]
fn test_release_queue_drains_per_context() {
    let queue: ReleaseQueue<Arc<u32>> = ReleaseQueue::new();
    let handles: Vec<_> = (0..4u32)
        .map(|i| {
            let queue = queue.clone();
            thread::spawn(move || {
                queue.post(ContextId(i % 2), Arc::new(i));
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("poster thread panicked");
    }
    assert_eq!(queue.len(), 4);

    let mut even: Vec<u32> = queue.drain_for(ContextId(0)).iter().map(|t| **t).collect();
    even.sort_unstable();
    assert_eq!(even, vec![0, 2]);
    assert_eq!(queue.len(), 2);
    assert!(queue.drain_for(ContextId(0)).is_empty());
    assert_eq!(queue.drain_for(ContextId(1)).len(), 2);
    assert!(queue.is_empty());
}
