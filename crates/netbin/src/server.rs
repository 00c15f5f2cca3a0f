//! Bridge bootstrap: binds the listener and runs acceptor, workers and
//! shutdown coordination together.

use std::future::Future;
use std::sync::Arc;

use netbin_core::Config;
use tracing::info;

use crate::acceptor::Acceptor;
use crate::admission::Admission;
use crate::error::ServerError;
use crate::launcher::Launcher;
use crate::listener::Listener;
use crate::shutdown::{Coordinator, Phase};
use crate::worker::ConnectionWorker;

/// A bound, not yet serving, bridge.
#[derive(Debug)]
pub struct Server {
    config: Config,
    listener: Listener,
    coordinator: Coordinator,
}

impl Server {
    /// Validate `config` and bind its listener.
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = Listener::bind(config.domain, &config.addr)
            .await
            .map_err(|source| ServerError::Listen {
                addr: config.addr.clone(),
                source,
            })?;
        let local = listener.local_addr();
        info!(domain = %config.domain, "listening for connections on {local}");

        Ok(Self {
            config,
            listener,
            coordinator: Coordinator::new(),
        })
    }

    pub fn local_addr(&self) -> String {
        self.listener.local_addr()
    }

    /// Watch the shutdown phase.
    pub fn phases(&self) -> tokio::sync::watch::Receiver<Phase> {
        self.coordinator.subscribe()
    }

    /// Serve until `shutdown` resolves, then stop accepting and wait for
    /// every in-flight session to finish.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            listener,
            coordinator,
        } = self;

        let cancel = coordinator.token();
        let launcher = Launcher::new(&config.program, &config.args, cancel.clone());
        let worker = Arc::new(ConnectionWorker::new(launcher, config.keepalive()));
        let acceptor = Acceptor::new(
            listener,
            config
                .admission_limit()
                .map_or_else(Admission::unlimited, Admission::new),
            worker,
            cancel.clone(),
            coordinator.tracker(),
        );

        let mut accepting = coordinator.tracker().spawn(acceptor.run());
        let accepted = tokio::select! {
            () = shutdown => {
                coordinator.begin();
                (&mut accepting).await
            }
            joined = &mut accepting => joined,
        };

        if let Err(e) = accepted? {
            // Do not wait for sessions: nothing more can be accepted. The
            // error is reported once, by the caller.
            cancel.cancel();
            return Err(e);
        }

        coordinator.begin();
        coordinator.drained().await;
        Ok(())
    }

    /// Serve until the process receives a termination request.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(crate::shutdown::termination_requested()).await
    }
}
