use std::{
    process::ExitCode,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use dataplane_snmp_agent::{
    agent::Agent,
    agentx::Session,
    configuration::{Configuration, Parser},
    dataplane::SysfsDataplane,
    ifmib::IfMibAgent,
    metadata::Metadata,
};

const DESCRIPTION: &str = "dataplane-snmp-agent IF-MIB sub-agent";

#[tokio::main]
async fn main() -> ExitCode {
    let conf = Configuration::parse();

    let default_filter = if conf.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = conf.validate() {
        log::error!("Configuration is broken: {}", e);
        return ExitCode::FAILURE;
    }

    let metadata = match &conf.config {
        Some(path) => match Metadata::from_file(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                log::error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Metadata::default(),
    };

    let address = match conf.master_address() {
        Ok(address) => address,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    log::info!("Configuration valid. Starting up...");

    let session = Session::new(address, DESCRIPTION)
        .with_recv_timeout(conf.recv_timeout())
        .with_debug(conf.debug_agent);
    let application = IfMibAgent::new(SysfsDataplane::new(&conf.sysfs_root), metadata);
    let mut agent = Agent::new(session, application, conf.period());

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = cancel.clone();

    // The session does synchronous socket I/O.
    let mut worker = tokio::task::spawn_blocking(move || agent.run(&cancel_clone));

    tokio::select! {
        result = &mut worker => {
            return match result {
                Ok(Ok(())) => ExitCode::SUCCESS,
                Ok(Err(e)) => {
                    log::error!("{}", e);
                    ExitCode::FAILURE
                }
                Err(e) => {
                    log::error!("Agent task failed: {}", e);
                    ExitCode::FAILURE
                }
            };
        }
        _ = shutdown_signal() => {
            log::info!("Shutdown requested");
        }
    }

    cancel.store(true, Ordering::Relaxed);
    match worker.await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Agent task failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                log::warn!("Cannot install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
