pub mod client;

// Server lifecycle API (feature-gated). Non-API builds get no-op stubs.
#[cfg(feature = "api")]
pub mod server;

#[cfg(not(feature = "api"))]
pub mod server {
    use crate::persistence::settings::AppSettings;

    pub fn start_server(_cfg: &AppSettings) -> anyhow::Result<()> {
        anyhow::bail!("this build was compiled without the `api` feature")
    }
    pub fn stop_server() {}
    pub fn is_running() -> bool { false }
}
