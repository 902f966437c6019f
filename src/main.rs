mod codec;
mod config;
#[cfg(target_os = "linux")]
mod discovery;
mod force_feedback;
mod session;
mod supervisor;
mod usb;
mod virtual_controller;

#[cfg(target_os = "linux")]
fn main() -> anyhow::Result<()> {
    use config::DriverConfig;
    use discovery::Discovery;
    use supervisor::Supervisor;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args_os().nth(1) {
        Some(path) => DriverConfig::load_from(std::path::Path::new(&path)),
        None => DriverConfig::load(),
    }
    .unwrap_or_else(|| {
        log::info!("Using default config");
        DriverConfig::default()
    });
    let session_config = config.session_config();

    let usb = rusb::Context::new()
        .map_err(|e| anyhow::anyhow!("Failed to initialize libusb: {}", e))?;
    let supervisor = Supervisor::new();
    let discovery = Discovery::new()?;

    log::info!("Waiting for PlayStation controllers");

    discovery.run(|identity| {
        let usb = usb.clone();
        let config = session_config.clone();
        supervisor.spawn(identity, move |identity| serve(identity, config, usb));
    })
}

#[cfg(target_os = "linux")]
fn serve(identity: usb::DeviceIdentity, config: session::SessionConfig, context: rusb::Context) {
    use session::DeviceSession;
    use usb::UsbTransport;
    use virtual_controller::VirtualXboxController;

    let session = DeviceSession::open(
        identity,
        config,
        |identity| UsbTransport::open(&context, identity),
        VirtualXboxController::new,
    );

    match session {
        Ok(session) => {
            session.run();
        }
        Err(e) => log::error!("{}: {}", identity, e),
    }
}

#[cfg(not(target_os = "linux"))]
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    anyhow::bail!("psxpad needs Linux uinput and udev")
}
