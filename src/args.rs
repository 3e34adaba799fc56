use clap::Parser;
use std::time::Duration;

use crate::logo::FetchLimits;
use crate::pipeline::ServiceConfig;

#[derive(Parser, Debug)]
#[command(name = "styled-qr")]
#[command(about = "Serve styled QR codes with gradients and logo overlays over HTTP")]
pub struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "3007")]
    pub port: u16,

    /// Total time allowed for a logo download, in seconds
    #[arg(long, default_value = "10")]
    pub logo_timeout: u64,

    /// Time allowed to connect to a logo host, in seconds
    #[arg(long, default_value = "5")]
    pub logo_connect_timeout: u64,

    /// Largest accepted logo body, in bytes
    #[arg(long, default_value = "10485760")]
    pub max_logo_bytes: u64,

    /// Largest accepted `size` query parameter, in pixels
    #[arg(long, default_value = "4096")]
    pub max_size: u32,

    /// Overall time budget for one `/generate` request, in seconds
    #[arg(long, default_value = "30")]
    pub request_timeout: u64,
}

impl Args {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            max_size: self.max_size,
            request_timeout: Duration::from_secs(self.request_timeout),
            fetch: FetchLimits {
                timeout: Duration::from_secs(self.logo_timeout),
                connect_timeout: Duration::from_secs(self.logo_connect_timeout),
                max_bytes: self.max_logo_bytes,
            },
        }
    }
}
