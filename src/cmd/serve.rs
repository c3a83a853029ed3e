use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use textburn::ServiceConfig;

pub async fn cmd_serve(config_path: Option<&Path>, bind: Option<SocketAddr>) -> Result<()> {
    let mut config = ServiceConfig::load(config_path)?;
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }

    textburn::http::serve(Arc::new(config)).await
}
