use std::net::{IpAddr, SocketAddr};

use log::info;

use super::routes::{api_routes, ApiContext};
use crate::error_handling::types::WebError;

/// HTTP API and WebSocket server.
pub struct WebServer {
    context: ApiContext,
}

impl WebServer {
    pub fn new(context: ApiContext) -> Self {
        Self { context }
    }

    /// Serves the API until the process stops.
    pub async fn start(&self, bind_address: &str, port: u16) -> Result<(), WebError> {
        let addr = socket_addr(bind_address, port)?;
        info!("API listening on http://{}", addr);
        warp::serve(api_routes(self.context.clone())).run(addr).await;
        Ok(())
    }
}

fn socket_addr(bind_address: &str, port: u16) -> Result<SocketAddr, WebError> {
    let ip: IpAddr = bind_address
        .trim()
        .parse()
        .map_err(|_| WebError::InvalidBindAddress(bind_address.to_string()))?;
    Ok(SocketAddr::new(ip, port))
}
