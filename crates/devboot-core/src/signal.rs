use tokio::sync::watch;

const QUIET: u8 = 0;
const INTERRUPTED: u8 = 1;
const FORCED: u8 = 2;

/// Exit status used when a third signal abandons shutdown.
pub const ABANDONED_EXIT_CODE: i32 = 130;

/// Latching interrupt flag shared by every interruptible step.
///
/// Once triggered it stays triggered, so a Ctrl+C that lands between two
/// steps is still observed by the next one. A second signal escalates to
/// [`forced`](Self::forced): running children are killed without waiting out
/// their grace period.
#[derive(Clone)]
pub struct Interrupt {
    rx: watch::Receiver<u8>,
}

pub struct InterruptTrigger {
    tx: watch::Sender<u8>,
}

impl InterruptTrigger {
    pub fn trigger(&self) {
        self.raise(INTERRUPTED);
    }

    pub fn force(&self) {
        self.raise(FORCED);
    }

    fn raise(&self, level: u8) {
        self.tx.send_if_modified(|current| {
            if *current < level {
                *current = level;
                true
            } else {
                false
            }
        });
    }
}

impl Interrupt {
    /// A manually driven interrupt.
    pub fn channel() -> (InterruptTrigger, Interrupt) {
        let (tx, rx) = watch::channel(QUIET);
        (InterruptTrigger { tx }, Interrupt { rx })
    }

    /// Trip on SIGINT/SIGTERM (Ctrl+C on Windows). Must be called from inside
    /// a tokio runtime; the handlers are installed before this returns.
    ///
    /// First signal interrupts, second forces, third exits the process with
    /// [`ABANDONED_EXIT_CODE`] without further cleanup.
    pub fn listen() -> std::io::Result<Self> {
        let (trigger, interrupt) = Self::channel();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sigterm = signal(SignalKind::terminate())?;
            tokio::spawn(async move {
                let mut received = 0u32;
                loop {
                    tokio::select! {
                        _ = sigint.recv() => tracing::debug!("received SIGINT"),
                        _ = sigterm.recv() => tracing::debug!("received SIGTERM"),
                    }
                    received += 1;
                    escalate(&trigger, received);
                }
            });
        }
        #[cfg(not(unix))]
        {
            tokio::spawn(async move {
                let mut received = 0u32;
                while tokio::signal::ctrl_c().await.is_ok() {
                    received += 1;
                    escalate(&trigger, received);
                }
            });
        }

        Ok(interrupt)
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() >= INTERRUPTED
    }

    pub fn is_forced(&self) -> bool {
        *self.rx.borrow() >= FORCED
    }

    /// Resolves once the interrupt has fired. Never resolves if the trigger
    /// is dropped without firing.
    pub async fn triggered(&mut self) {
        self.reached(INTERRUPTED).await
    }

    /// Resolves once a second signal has asked for an immediate stop.
    pub async fn forced(&mut self) {
        self.reached(FORCED).await
    }

    async fn reached(&mut self, level: u8) {
        if self.rx.wait_for(|current| *current >= level).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn escalate(trigger: &InterruptTrigger, received: u32) {
    match received {
        1 => trigger.trigger(),
        2 => {
            tracing::warn!("second interrupt, stopping without grace period (again to exit now)");
            trigger.force();
        }
        _ => {
            tracing::warn!("third interrupt, exiting without cleanup");
            std::process::exit(ABANDONED_EXIT_CODE);
        }
    }
}
