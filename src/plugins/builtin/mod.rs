//! Built-in plugins shipped with the host

pub mod admin;
pub mod echo;
pub mod repeat;

pub use admin::AdminPlugin;
pub use echo::EchoPlugin;
pub use repeat::RepeatPlugin;

use super::resolver::FactoryResolver;

/// Resolver providing every built-in plugin under its own name
pub fn resolver() -> FactoryResolver {
    FactoryResolver::new()
        .with(admin::NAME, AdminPlugin::new)
        .with(echo::NAME, EchoPlugin::new)
        .with(repeat::NAME, RepeatPlugin::new)
}
