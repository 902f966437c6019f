use super::{ForceFeedbackSlot, RelayMode, Rumble};
use crate::codec::DeviceKind;
use crate::usb::{Transport, TransportError, USB_TIMEOUT};
use crate::virtual_controller::codes::{EV_FF, EV_UINPUT, FF_RUMBLE, UI_FF_ERASE, UI_FF_UPLOAD};
use crate::virtual_controller::{FeedbackChannel, PadEvent};
use crossbeam_channel::Sender;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Why the relay loop returned
#[derive(Debug)]
pub enum RelayExit {
    /// The session asked it to stop
    Cancelled,
    /// The virtual device could not be read any more
    ReadFailed(io::Error),
}

/// Forwards force feedback requests from the virtual device to the pad
pub struct RumbleRelay<T: Transport, F: FeedbackChannel> {
    channel: F,
    transport: Arc<T>,
    kind: DeviceKind,
    mode: RelayMode,
    ps3_led_mask: u8,
    /// Upper bound on how long a stop request goes unnoticed
    wakeup: Duration,
    slot: ForceFeedbackSlot,
}

impl<T, F> RumbleRelay<T, F>
where
    T: Transport + 'static,
    F: FeedbackChannel + 'static,
{
    pub fn new(
        channel: F,
        transport: Arc<T>,
        kind: DeviceKind,
        mode: RelayMode,
        ps3_led_mask: u8,
        wakeup: Duration,
    ) -> Self {
        Self {
            channel,
            transport,
            kind,
            mode,
            ps3_led_mask,
            wakeup,
            slot: ForceFeedbackSlot::default(),
        }
    }

    /// Run on a thread of its own. The exit reason is also sent on `exits`
    /// so the poll loop notices a dead relay.
    pub fn spawn(self, name: String, exits: Sender<RelayExit>) -> io::Result<RelayHandle> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let thread = std::thread::Builder::new().name(name).spawn(move || {
            let exit = self.run(&thread_running);
            let failed = matches!(exit, RelayExit::ReadFailed(_));
            // The session may already be gone
            let _ = exits.send(exit);
            failed
        })?;

        Ok(RelayHandle {
            running,
            thread: Some(thread),
        })
    }

    pub fn run(mut self, running: &AtomicBool) -> RelayExit {
        log::debug!("FF relay started for {} pad ({:?} mode)", self.kind, self.mode);

        while running.load(Ordering::SeqCst) {
            let event = match self.channel.next_event(self.wakeup) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::error!("Error reading FF events: {}", e);
                    return RelayExit::ReadFailed(e);
                }
            };

            if let Some(rumble) = self.handle(event) {
                self.send(rumble);
            }
        }

        log::debug!("FF relay for {} pad stopped", self.kind);
        RelayExit::Cancelled
    }

    /// Apply one record; returns intensities to forward, if any
    fn handle(&mut self, event: PadEvent) -> Option<Rumble> {
        match (event.type_, event.code) {
            (EV_UINPUT, UI_FF_UPLOAD) => {
                match self.channel.upload(event.value as u32) {
                    Ok(effect) if self.mode == RelayMode::Effects => {
                        if self.slot.store(&effect) {
                            log::debug!("Stored FF effect {}", effect.id);
                        } else {
                            log::warn!("Uploaded effect {} is not FF_RUMBLE: {:?}", effect.id, effect.kind);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("FF upload {} failed: {}", event.value, e),
                }
                None
            }
            (EV_UINPUT, UI_FF_ERASE) => {
                match self.channel.erase(event.value as u32) {
                    Ok(id) => {
                        self.slot.erase(id);
                        log::debug!("FF effect {} erased", id);
                    }
                    Err(e) => log::warn!("FF erase {} failed: {}", event.value, e),
                }
                None
            }
            (EV_FF, code) => match self.mode {
                RelayMode::Effects => {
                    let rumble = self.slot.play(code as i16, event.value);
                    match rumble {
                        Some(_) => log::debug!("FF effect {} {:?}", code, self.slot.state()),
                        None => log::debug!("EV_FF event for unknown effect ID {}", code),
                    }
                    rumble
                }
                RelayMode::Direct if code == FF_RUMBLE => Some(Rumble::from_packed(event.value)),
                RelayMode::Direct => None,
            },
            _ => None,
        }
    }

    fn send(&self, rumble: Rumble) {
        let (setup, report) = rumble.output_report(self.kind, self.ps3_led_mask);
        match self.transport.write_control(&setup, &report, USB_TIMEOUT) {
            Ok(_) => log::debug!(
                "Rumble sent: strong={}, weak={}",
                rumble.strong,
                rumble.weak
            ),
            Err(TransportError::NoDevice) => log::debug!("Rumble dropped, pad is gone"),
            Err(e) => log::warn!("Failed to send rumble: {}", e),
        }
    }
}

/// Owner side of a running relay thread
pub struct RelayHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<bool>>,
}

impl RelayHandle {
    /// Ask the relay to stop and wait until it has. Safe to call twice.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread.take() {
            match handle.join() {
                Ok(true) => log::debug!("FF relay had already failed"),
                Ok(false) => {}
                Err(e) => log::error!("FF relay thread panicked: {:?}", e),
            }
        }
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::ControlSetup;
    use crate::virtual_controller::{EffectKind, UploadedEffect};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Records every rumble transfer
    #[derive(Default)]
    struct RecordingTransport {
        writes: Mutex<Vec<(ControlSetup, Vec<u8>)>>,
    }

    impl Transport for RecordingTransport {
        fn read_interrupt(&self, _: u8, _: &mut [u8], _: Duration) -> Result<usize, TransportError> {
            Err(TransportError::Timeout)
        }

        fn read_control(
            &self,
            _: &ControlSetup,
            _: &mut [u8],
            _: Duration,
        ) -> Result<usize, TransportError> {
            Ok(0)
        }

        fn write_control(
            &self,
            setup: &ControlSetup,
            data: &[u8],
            _: Duration,
        ) -> Result<usize, TransportError> {
            self.writes.lock().unwrap().push((*setup, data.to_vec()));
            Ok(data.len())
        }
    }

    /// Scripted control channel. Once the script runs out it either fails
    /// every read or idles, depending on `then_fail`.
    struct ScriptedChannel {
        events: VecDeque<io::Result<Option<PadEvent>>>,
        uploads: VecDeque<io::Result<UploadedEffect>>,
        erased_id: i16,
        then_fail: bool,
        acks: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ScriptedChannel {
        fn new(events: Vec<io::Result<Option<PadEvent>>>) -> Self {
            Self {
                events: events.into(),
                uploads: VecDeque::new(),
                erased_id: 0,
                then_fail: true,
                acks: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl FeedbackChannel for ScriptedChannel {
        fn next_event(&mut self, timeout: Duration) -> io::Result<Option<PadEvent>> {
            match self.events.pop_front() {
                Some(next) => next,
                None if self.then_fail => Err(io::Error::new(io::ErrorKind::BrokenPipe, "done")),
                None => {
                    std::thread::sleep(timeout);
                    Ok(None)
                }
            }
        }

        fn upload(&mut self, _request_id: u32) -> io::Result<UploadedEffect> {
            self.acks.lock().unwrap().push("upload");
            self.uploads.pop_front().unwrap_or(Ok(UploadedEffect {
                id: 0,
                kind: EffectKind::Other(0),
            }))
        }

        fn erase(&mut self, _request_id: u32) -> io::Result<i16> {
            self.acks.lock().unwrap().push("erase");
            Ok(self.erased_id)
        }
    }

    fn upload_request(id: i32) -> io::Result<Option<PadEvent>> {
        Ok(Some(PadEvent::new(EV_UINPUT, UI_FF_UPLOAD, id)))
    }

    fn erase_request(id: i32) -> io::Result<Option<PadEvent>> {
        Ok(Some(PadEvent::new(EV_UINPUT, UI_FF_ERASE, id)))
    }

    fn play(effect: u16, value: i32) -> io::Result<Option<PadEvent>> {
        Ok(Some(PadEvent::new(EV_FF, effect, value)))
    }

    fn make_relay(
        channel: ScriptedChannel,
        kind: DeviceKind,
        mode: RelayMode,
    ) -> (RumbleRelay<RecordingTransport, ScriptedChannel>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let relay = RumbleRelay::new(
            channel,
            Arc::clone(&transport),
            kind,
            mode,
            0x02,
            Duration::from_millis(5),
        );
        (relay, transport)
    }

    #[test]
    fn upload_then_play_sends_uploaded_magnitudes() {
        let mut channel = ScriptedChannel::new(vec![upload_request(1), play(0, 1), play(0, 0)]);
        channel.uploads.push_back(Ok(UploadedEffect {
            id: 0,
            kind: EffectKind::Rumble {
                strong: 0xff00,
                weak: 0x8000,
            },
        }));
        let (relay, transport) = make_relay(channel, DeviceKind::Ps4, RelayMode::Effects);

        let exit = relay.run(&AtomicBool::new(true));
        assert!(matches!(exit, RelayExit::ReadFailed(_)));

        let writes = transport.writes.lock().unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!((writes[0].1[5], writes[0].1[4]), (0xff, 0x80));
        assert_eq!((writes[1].1[5], writes[1].1[4]), (0, 0));
    }

    #[test]
    fn play_of_unknown_effect_sends_nothing() {
        let channel = ScriptedChannel::new(vec![play(0, 1), play(7, 1)]);
        let (relay, transport) = make_relay(channel, DeviceKind::Ps3, RelayMode::Effects);
        relay.run(&AtomicBool::new(true));
        assert!(transport.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn erase_is_acknowledged_on_empty_slot() {
        let channel = ScriptedChannel::new(vec![erase_request(4), play(0, 1)]);
        let acks = Arc::clone(&channel.acks);
        let (relay, transport) = make_relay(channel, DeviceKind::Ps3, RelayMode::Effects);
        relay.run(&AtomicBool::new(true));
        assert_eq!(*acks.lock().unwrap(), vec!["erase"]);
        assert!(transport.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn erased_effect_no_longer_plays() {
        let mut channel =
            ScriptedChannel::new(vec![upload_request(1), erase_request(2), play(0, 1)]);
        channel.uploads.push_back(Ok(UploadedEffect {
            id: 0,
            kind: EffectKind::Rumble { strong: 1, weak: 1 },
        }));
        let (relay, transport) = make_relay(channel, DeviceKind::Ps4, RelayMode::Effects);
        relay.run(&AtomicBool::new(true));
        assert!(transport.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_upload_is_not_fatal() {
        let mut channel = ScriptedChannel::new(vec![upload_request(1), erase_request(1)]);
        channel
            .uploads
            .push_back(Err(io::Error::from(io::ErrorKind::InvalidInput)));
        let acks = Arc::clone(&channel.acks);
        let (relay, _) = make_relay(channel, DeviceKind::Ps4, RelayMode::Effects);
        relay.run(&AtomicBool::new(true));
        assert_eq!(*acks.lock().unwrap(), vec!["upload", "erase"]);
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let channel = ScriptedChannel::new(vec![
            Err(io::Error::from(io::ErrorKind::Interrupted)),
            Ok(None),
            play(FF_RUMBLE, 0x1234_5678),
        ]);
        let (relay, transport) = make_relay(channel, DeviceKind::Ps4, RelayMode::Direct);
        let exit = relay.run(&AtomicBool::new(true));
        assert!(matches!(exit, RelayExit::ReadFailed(e) if e.kind() == io::ErrorKind::BrokenPipe));
        assert_eq!(transport.writes.lock().unwrap().len(), 1);
    }

    #[test]
    fn direct_mode_forwards_packed_intensities() {
        let mut channel = ScriptedChannel::new(vec![
            upload_request(1),
            play(FF_RUMBLE, 0x4000_0000u32 as i32),
            play(0, 1),
        ]);
        channel.uploads.push_back(Ok(UploadedEffect {
            id: 0,
            kind: EffectKind::Rumble { strong: 9, weak: 9 },
        }));
        let acks = Arc::clone(&channel.acks);
        let (relay, transport) = make_relay(channel, DeviceKind::Ps3, RelayMode::Direct);
        relay.run(&AtomicBool::new(true));

        // Upload still acknowledged, but effect id 0 is never played
        assert_eq!(*acks.lock().unwrap(), vec!["upload"]);
        let writes = transport.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1[4], 0x40);
        assert_eq!(writes[0].1[2], 0);
    }

    #[test]
    fn stop_request_ends_relay_promptly() {
        let mut channel = ScriptedChannel::new(vec![]);
        channel.then_fail = false;
        let (relay, transport) = make_relay(channel, DeviceKind::Ps4, RelayMode::Effects);
        let (tx, rx) = crossbeam_channel::unbounded();

        let mut handle = relay.spawn("test-relay".to_string(), tx).unwrap();
        assert!(handle.thread.is_some());
        handle.stop();
        assert!(handle.thread.is_none());
        assert!(matches!(rx.try_recv(), Ok(RelayExit::Cancelled)));

        // Second stop is a no-op
        handle.stop();
        assert_eq!(Arc::strong_count(&transport), 1);
    }

    #[test]
    fn failed_relay_reports_exit() {
        let channel = ScriptedChannel::new(vec![]);
        let (relay, _) = make_relay(channel, DeviceKind::Ps4, RelayMode::Effects);
        let (tx, rx) = crossbeam_channel::unbounded();

        let _handle = relay.spawn("test-relay".to_string(), tx).unwrap();
        let exit = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(exit, RelayExit::ReadFailed(_)));
    }
}
