//! Native messaging host for Focus Shield.
//!
//! Serves the bridge over stdin/stdout using length-prefixed JSON frames.
//! stdout carries the protocol, so every log line goes to stderr.

use focus_shield_lib::config::FocusConfig;
use log::{error, info};
use std::error::Error;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match FocusConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config) {
        error!("Native host error: {e}");
        std::process::exit(1);
    }
    info!("Native host exiting");
}

#[cfg(target_os = "linux")]
fn run(config: FocusConfig) -> Result<(), Box<dyn Error>> {
    use focus_shield_lib::native_host::NativeHost;
    use focus_shield_lib::platform::linux;
    use focus_shield_lib::Bridge;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("focus-shield")
        .build()?;

    let (host, overlay) = linux::connect()?;
    let bridge = Arc::new(Bridge::new(config, host, runtime.handle().clone()));

    let controller = Arc::downgrade(bridge.overlay());
    overlay.on_click(move || {
        if let Some(controller) = controller.upgrade() {
            controller.return_to_app();
        }
    });

    let native_host = Arc::new(NativeHost::new(
        Arc::clone(&bridge),
        Arc::new(Mutex::new(io::stdout())),
    ));
    let forwarder = Arc::clone(&native_host);
    let events = bridge.subscribe_timer_events();
    runtime.spawn(async move { forwarder.forward_timer_events(events).await });

    info!("Native host ready");
    // Returns once the UI closes stdin.
    let result = native_host.run(&mut io::stdin().lock());

    bridge.shutdown();
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(result?)
}

#[cfg(not(target_os = "linux"))]
fn run(_config: FocusConfig) -> Result<(), Box<dyn Error>> {
    Err("no host integration is available for this platform".into())
}
