//! User-installable logging sink (spec §6 "Logging"), backed by `tracing`.
//!
//! The engine itself always emits through `tracing` macros, the way the
//! teacher crate instruments its CPU backend kernels
//! (`#[tracing::instrument(name = "kernel_matmul")]`). Host applications that
//! already run a `tracing` subscriber get everything for free. Applications
//! that just want the spec's plain "install a callback filtered by level"
//! surface can use [`install`] instead, which wires a callback up as a
//! `tracing` layer.

use std::sync::{Arc, RwLock};
use tracing::Level;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

/// Severity filter for the installed callback, mirroring `bcnn_log_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Silent,
}

impl LogLevel {
    fn admits(self, level: &Level) -> bool {
        match self {
            LogLevel::Silent => false,
            LogLevel::Error => *level == Level::ERROR,
            LogLevel::Warning => *level == Level::ERROR || *level == Level::WARN,
            LogLevel::Info => true,
        }
    }
}

type Callback = Arc<dyn Fn(&str) + Send + Sync>;

struct CallbackLayer {
    level: LogLevel,
    callback: Callback,
}

impl<S: tracing::Subscriber> Layer<S> for CallbackLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if !self.level.admits(event.metadata().level()) {
            return;
        }
        let mut message = String::new();
        struct Visitor<'a>(&'a mut String);
        impl<'a> tracing::field::Visit for Visitor<'a> {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    use std::fmt::Write;
                    let _ = write!(self.0, "{:?}", value);
                }
            }
        }
        event.record(&mut Visitor(&mut message));
        (self.callback)(&message);
    }
}

static INSTALLED: RwLock<bool> = RwLock::new(false);

/// Installs a user callback as the process-wide logging sink, filtered by
/// `level`. Safe to call at most once per process; subsequent calls are
/// no-ops so test binaries that each construct a network don't fight over
/// the global subscriber.
pub fn install<F>(level: LogLevel, callback: F)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    let mut installed = INSTALLED.write().unwrap();
    if *installed {
        return;
    }
    let layer = CallbackLayer {
        level,
        callback: Arc::new(callback),
    };
    let _ = tracing_subscriber::registry().with(layer).try_init();
    *installed = true;
}
