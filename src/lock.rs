use std::sync::{Mutex, MutexGuard};

/// Take a lock even if a previous holder panicked. Analysis state stays usable
/// after a consumer callback panics on the router thread.
pub(crate) fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        tracing::warn!(context, "mutex poisoned; recovering");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::lock_or_recover;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn recovers_poisoned_lock() {
        let shared = Arc::new(Mutex::new(7u32));
        let poisoner = shared.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();
        assert!(shared.is_poisoned());
        assert_eq!(*lock_or_recover(&shared, "test"), 7);
    }
}
