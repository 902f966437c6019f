use super::codes::*;
use super::uinput_ffi::*;
use super::{
    EffectKind, FeedbackChannel, PadEvent, UploadedEffect, VirtualController, VirtualDeviceConfig,
    XBOX_PRODUCT_ID, XBOX_VENDOR_ID, XBOX_VERSION,
};
use crate::codec::stick::{XPAD_FLAT, XPAD_FUZZ, XPAD_STICK_MAX, XPAD_STICK_MIN};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

pub struct VirtualXboxController {
    uinput_file: File,
    name: String,
}

impl VirtualXboxController {
    pub fn new(config: &VirtualDeviceConfig) -> anyhow::Result<Self> {
        let uinput_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(UINPUT_PATH)
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to open {}: {}. Try: sudo chmod 666 /dev/uinput",
                    UINPUT_PATH,
                    e
                )
            })?;

        let uinput_fd = uinput_file.as_raw_fd();

        // The relay waits with poll() and must never block inside read()
        unsafe {
            let flags = libc::fcntl(uinput_fd, libc::F_GETFL);
            if flags < 0 {
                return Err(anyhow::anyhow!("Failed to get uinput file flags"));
            }
            if libc::fcntl(uinput_fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
                return Err(anyhow::anyhow!("Failed to set uinput non-blocking mode"));
            }
        }

        unsafe {
            for ev in [EV_KEY, EV_ABS, EV_SYN] {
                ui_set_evbit(uinput_fd, ev as _)
                    .map_err(|e| anyhow::anyhow!("Failed to set event type {}: {}", ev, e))?;
            }

            for btn in XBOX_BUTTONS {
                ui_set_keybit(uinput_fd, btn as _)
                    .map_err(|e| anyhow::anyhow!("Failed to set button {:#x}: {}", btn, e))?;
            }

            for axis in XBOX_AXES {
                ui_set_absbit(uinput_fd, axis as _)
                    .map_err(|e| anyhow::anyhow!("Failed to set axis {:#x}: {}", axis, e))?;
            }

            if config.force_feedback {
                ui_set_evbit(uinput_fd, EV_FF as _)
                    .map_err(|e| anyhow::anyhow!("Failed to set EV_FF: {}", e))?;
                ui_set_ffbit(uinput_fd, FF_RUMBLE as _)
                    .map_err(|e| anyhow::anyhow!("Failed to set FF_RUMBLE: {}", e))?;
            }
        }

        let id = InputId {
            bustype: BUS_USB,
            vendor: XBOX_VENDOR_ID,
            product: XBOX_PRODUCT_ID,
            version: XBOX_VERSION,
        };
        // A single effect slot; the pad has nowhere to store more
        let ff_effects_max = if config.force_feedback { 1 } else { 0 };
        let mut dev = UinputUserDev::new(&config.name, id, ff_effects_max);

        for axis in [ABS_X, ABS_Y, ABS_RX, ABS_RY] {
            dev.set_abs(axis, XPAD_STICK_MIN, XPAD_STICK_MAX, XPAD_FUZZ, XPAD_FLAT);
        }
        for axis in [ABS_Z, ABS_RZ] {
            dev.set_abs(axis, TRIGGER_MIN, TRIGGER_MAX, 0, 0);
        }
        for axis in [ABS_HAT0X, ABS_HAT0Y] {
            dev.set_abs(axis, -1, 1, 0, 0);
        }

        let mut writer = &uinput_file;
        writer
            .write_all(dev.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to write device struct: {}", e))?;

        unsafe { ui_dev_create(uinput_fd) }
            .map_err(|e| anyhow::anyhow!("Failed to create device: {}", e))?;

        log::info!(
            "Uinput gamepad \"{}\" created (force feedback: {})",
            config.name,
            config.force_feedback
        );

        Ok(Self {
            uinput_file,
            name: config.name.clone(),
        })
    }
}

impl Drop for VirtualXboxController {
    fn drop(&mut self) {
        if let Err(e) = unsafe { ui_dev_destroy(self.uinput_file.as_raw_fd()) } {
            log::warn!("Failed to destroy uinput device: {}", e);
        } else {
            log::info!("Uinput gamepad \"{}\" removed", self.name);
        }
    }
}

impl VirtualController for VirtualXboxController {
    type Feedback = UinputFeedback;

    fn emit(&mut self, events: &[PadEvent]) -> anyhow::Result<()> {
        let mut buffer = Vec::with_capacity(events.len() * INPUT_EVENT_SIZE);
        for event in events {
            buffer.extend_from_slice(&encode_event(event));
        }
        self.uinput_file.write_all(&buffer)?;
        Ok(())
    }

    fn feedback_channel(&self) -> anyhow::Result<UinputFeedback> {
        // Duplicate the file descriptor so the relay has its own reference
        let file = self
            .uinput_file
            .try_clone()
            .map_err(|e| anyhow::anyhow!("Failed to duplicate uinput fd: {}", e))?;
        Ok(UinputFeedback { file })
    }
}

/// Relay side of the uinput device
pub struct UinputFeedback {
    file: File,
}

impl FeedbackChannel for UinputFeedback {
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<PadEvent>> {
        let mut pollfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        let poll_result = unsafe { libc::poll(&mut pollfd as *mut libc::pollfd, 1, timeout_ms) };
        if poll_result < 0 {
            return Err(io::Error::last_os_error());
        }
        if poll_result == 0 {
            return Ok(None);
        }
        if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "uinput device hung up",
            ));
        }

        let mut buffer = [0u8; INPUT_EVENT_SIZE];
        match self.file.read(&mut buffer) {
            Ok(n) if n == INPUT_EVENT_SIZE => Ok(Some(decode_event(&buffer))),
            Ok(n) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short uinput read of {} bytes", n),
            )),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn upload(&mut self, request_id: u32) -> io::Result<UploadedEffect> {
        let fd = self.file.as_raw_fd();
        let mut upload = UinputFFUpload::new(request_id);

        ff_handshake(
            &mut upload,
            |upload| unsafe { ui_begin_ff_upload(fd, upload) },
            |upload| unsafe { ui_end_ff_upload(fd, upload) },
            |upload| &mut upload.retval,
            "UPLOAD",
        )?;

        let kind = if upload.effect.type_ == FF_RUMBLE {
            let (strong, weak) = upload.effect.rumble_magnitudes();
            EffectKind::Rumble { strong, weak }
        } else {
            EffectKind::Other(upload.effect.type_)
        };

        Ok(UploadedEffect {
            id: upload.effect.id,
            kind,
        })
    }

    fn erase(&mut self, request_id: u32) -> io::Result<i16> {
        let fd = self.file.as_raw_fd();
        let mut erase = UinputFFErase::new(request_id);

        // kernel fills in effect_id
        ff_handshake(
            &mut erase,
            |erase| unsafe { ui_begin_ff_erase(fd, erase) },
            |erase| unsafe { ui_end_ff_erase(fd, erase) },
            |erase| &mut erase.retval,
            "ERASE",
        )?;

        Ok(erase.effect_id as i16)
    }
}

/// Run one begin/end pair of the uinput FF protocol. The end step always
/// runs once begin was attempted, carrying begin's errno as the result;
/// otherwise the client that requested the effect is never released.
fn ff_handshake<T>(
    request: &mut T,
    begin: impl FnOnce(&mut T) -> nix::Result<libc::c_int>,
    end: impl FnOnce(&T) -> nix::Result<libc::c_int>,
    retval: impl Fn(&mut T) -> &mut i32,
    what: &str,
) -> io::Result<()> {
    let begun = begin(request);
    match begun {
        Ok(_) => *retval(request) = 0,
        Err(e) => {
            log::error!("UI_BEGIN_FF_{} failed: {}", what, e);
            *retval(request) = -(e as i32);
        }
    }

    let ended = end(request);
    if let Err(e) = ended {
        log::error!("UI_END_FF_{} failed: {}", what, e);
    }

    begun?;
    ended?;
    Ok(())
}
