use crate::hook::{AsyncHook, HookConfig};
use crate::layer::HookLayer;
use crate::record::Level;
use crate::sink::DbSink;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Options for [`init_tracing_with_config`].
///
/// **Fields**
/// - `hook`: queue/flush configuration passed through to [`AsyncHook`].
/// - `min_level`: least severe level the layer captures.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is
///   stacked on top so events also show up on the console.
#[derive(Clone, Debug)]
pub struct InitConfig {
    pub hook: HookConfig,
    pub min_level: Level,
    pub enable_stdout: bool,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            hook: HookConfig::default(),
            min_level: Level::Error,
            enable_stdout: true,
        }
    }
}

/// Install a global `tracing` subscriber that ships events to `sink`.
///
/// Builds an [`AsyncHook`] over the sink, wraps it in a [`HookLayer`] and
/// sets the combined [`Registry`] as the global default subscriber, so all
/// `tracing` events in the process are observed by the layer.
///
/// Returns the hook handle; keep it around to `flush().await` before
/// process exit, or `close().await` for an orderly shutdown.
pub fn init_tracing_with_config(sink: Arc<dyn DbSink>, config: InitConfig) -> AsyncHook {
    let hook = AsyncHook::with_config(sink, config.hook);
    let layer = HookLayer::with_min_level(hook.clone(), config.min_level);

    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber).expect("set global subscriber");
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber).expect("set global subscriber");
    }

    hook
}

/// Initialize tracing with sensible defaults: errors only, 1s flush
/// interval, console mirror enabled.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`InitConfig::default`]. This is the recommended entrypoint for
/// typical services.
pub fn init_tracing(sink: Arc<dyn DbSink>) -> AsyncHook {
    init_tracing_with_config(sink, InitConfig::default())
}
