use crate::usb::DeviceIdentity;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

type Registry = Arc<Mutex<HashSet<(u8, u8)>>>;

/// Keeps one serving thread per pad.
///
/// Enumeration and hot-plug can report the same pad twice; only the first
/// report starts a thread. The pad may be served again once its thread ends.
#[derive(Default)]
pub struct Supervisor {
    active: Registry,
}

/// Registry entry, released when dropped
struct Claim {
    active: Registry,
    key: (u8, u8),
}

impl Drop for Claim {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.key);
        }
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&self, identity: &DeviceIdentity) -> Option<Claim> {
        let key = (identity.bus, identity.address);
        let mut active = self.active.lock().ok()?;
        active.insert(key).then(|| Claim {
            active: Arc::clone(&self.active),
            key,
        })
    }

    /// Run `serve` for the pad on its own thread unless it is already being
    /// served.
    pub fn spawn<F>(&self, identity: DeviceIdentity, serve: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(DeviceIdentity) + Send + 'static,
    {
        let Some(claim) = self.claim(&identity) else {
            log::debug!("{} is already being served", identity);
            return None;
        };

        let name = format!("pad-{:03}-{:03}", identity.bus, identity.address);
        let spawned = std::thread::Builder::new().name(name).spawn(move || {
            let _claim = claim;
            serve(identity);
        });

        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                // The claim moved into the closure and was dropped with it
                log::error!("Failed to start thread for {}: {}", identity, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DeviceKind;
    use std::time::Duration;

    impl Supervisor {
        fn is_active(&self, identity: &DeviceIdentity) -> bool {
            self.active
                .lock()
                .unwrap()
                .contains(&(identity.bus, identity.address))
        }
    }

    fn pad(bus: u8, address: u8) -> DeviceIdentity {
        DeviceIdentity {
            bus,
            address,
            kind: DeviceKind::Ps4,
        }
    }

    #[test]
    fn same_pad_is_served_once() {
        let supervisor = Supervisor::new();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);

        let first = supervisor
            .spawn(pad(1, 4), move |_| {
                let _ = release_rx.recv_timeout(Duration::from_secs(5));
            })
            .unwrap();
        assert!(supervisor.is_active(&pad(1, 4)));

        assert!(supervisor.spawn(pad(1, 4), |_| {}).is_none());

        release_tx.send(()).unwrap();
        first.join().unwrap();
        assert!(!supervisor.is_active(&pad(1, 4)));
    }

    #[test]
    fn pad_can_be_served_again_after_session_ends() {
        let supervisor = Supervisor::new();
        supervisor.spawn(pad(2, 9), |_| {}).unwrap().join().unwrap();
        assert!(!supervisor.is_active(&pad(2, 9)));

        let (tx, rx) = crossbeam_channel::unbounded();
        supervisor
            .spawn(pad(2, 9), move |identity| tx.send(identity).unwrap())
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), pad(2, 9));
    }

    #[test]
    fn different_addresses_run_side_by_side() {
        let supervisor = Supervisor::new();
        let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();
        let rx2 = release_rx.clone();

        let a = supervisor
            .spawn(pad(1, 4), move |_| {
                let _ = release_rx.recv_timeout(Duration::from_secs(5));
            })
            .unwrap();
        let b = supervisor
            .spawn(pad(1, 5), move |_| {
                let _ = rx2.recv_timeout(Duration::from_secs(5));
            })
            .unwrap();
        assert!(supervisor.is_active(&pad(1, 4)));
        assert!(supervisor.is_active(&pad(1, 5)));

        drop(release_tx);
        a.join().unwrap();
        b.join().unwrap();
        assert!(!supervisor.is_active(&pad(1, 4)));
        assert!(!supervisor.is_active(&pad(1, 5)));
    }

    #[test]
    fn panicking_session_releases_its_pad() {
        let supervisor = Supervisor::new();
        let handle = supervisor
            .spawn(pad(3, 1), |_| panic!("session blew up"))
            .unwrap();
        assert!(handle.join().is_err());
        assert!(!supervisor.is_active(&pad(3, 1)));
    }
}
