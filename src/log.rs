//! # Logging

use crate::context::Context;

#[macro_export]
macro_rules! info {
    ($ctx:expr,  $msg:expr) => {
        $crate::info!($ctx, $msg,)
    };
    ($ctx:expr, $msg:expr, $($args:expr),* $(,)?) => {{
        let formatted = format!($msg, $($args),*);
        let full = format!("{file}:{line}: {msg}",
                           file = file!(),
                           line = line!(),
                           msg = &formatted);
        $ctx.emit_event($crate::EventType::Info(full));
    }};
}

#[macro_export]
macro_rules! warn {
    ($ctx:expr, $msg:expr) => {
        $crate::warn!($ctx, $msg,)
    };
    ($ctx:expr, $msg:expr, $($args:expr),* $(,)?) => {{
        let formatted = format!($msg, $($args),*);
        let full = format!("{file}:{line}: {msg}",
                           file = file!(),
                           line = line!(),
                           msg = &formatted);
        $ctx.emit_event($crate::EventType::Warning(full));
    }};
}

#[macro_export]
macro_rules! error {
    ($ctx:expr, $msg:expr) => {
        $crate::error!($ctx, $msg,)
    };
    ($ctx:expr, $msg:expr, $($args:expr),* $(,)?) => {{
        let formatted = format!($msg, $($args),*);
        $ctx.emit_event($crate::EventType::Error(formatted));
    }};
}

pub(crate) trait LogExt<T> {
    /// Emits a warning if the receiver contained an Err value.
    ///
    /// Returns an [`Option<T>`] with the `Ok(_)` value, if any:
    /// - You won't get any warnings about unused results but can still use the value if you need it
    /// - This prevents the same warning from being printed to the log multiple times
    ///
    /// Thanks to `#[track_caller]` the location of the caller is printed to the log,
    /// just like with the warn!() macro.
    #[track_caller]
    fn log_err(self, context: &Context) -> Option<T>;
}

impl<T, E: std::fmt::Display> LogExt<T> for Result<T, E> {
    #[track_caller]
    fn log_err(self, context: &Context) -> Option<T> {
        match self {
            Err(e) => {
                let location = std::panic::Location::caller();
                // We are using Anyhow's .context() and to show the inner error, too, we need the {:#}:
                let full = format!(
                    "{file}:{line}: {e:#}",
                    file = location.file(),
                    line = location.line(),
                    e = e
                );
                // We can't use the warn!() macro here as the file!() and line!() macros
                // don't work well with #[track_caller]
                context.emit_event(crate::EventType::Warning(full));
                None
            }
            Ok(v) => Some(v),
        }
    }
}
