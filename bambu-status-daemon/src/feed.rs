//! MQTT connection to the printer
//!
//! Bambu printers in LAN mode run their own broker on port 8883 with a
//! self-signed certificate. We subscribe to the report topic and hand every
//! publish to the [`StatusPipeline`] inline, so there is never more than one
//! payload in flight.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, TlsConfiguration, Transport};
use thiserror::Error;
use tokio_rustls::rustls;
use tracing::{debug, info, warn};

use crate::config::PrinterConfig;
use crate::pipeline::StatusPipeline;

const TLS_PORT: u16 = 8883;
const PLAIN_PORT: u16 = 1883;

/// Full status pushes are well above rumqttc's 10 KiB default
const MAX_INCOMING_PACKET: usize = 1024 * 1024;
const MAX_OUTGOING_PACKET: usize = 64 * 1024;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty broker address")]
    Empty,

    #[error("unsupported scheme {0:?} (use ssl://, tls://, mqtts://, tcp:// or mqtt://)")]
    Scheme(String),

    #[error("invalid port {0:?}")]
    Port(String),
}

/// Where the printer's broker lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl FromStr for BrokerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_end_matches('/');

        let (tls, rest) = match s.split_once("://") {
            Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
                "ssl" | "tls" | "mqtts" => (true, rest),
                "tcp" | "mqtt" => (false, rest),
                other => return Err(AddressError::Scheme(other.to_string())),
            },
            // Printers only speak TLS
            None => (true, s),
        };

        let default_port = if tls { TLS_PORT } else { PLAIN_PORT };

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            // [v6]:port
            match bracketed.split_once(']') {
                Some((host, "")) => (host, default_port),
                Some((host, port)) => {
                    let port = port.strip_prefix(':').unwrap_or(port);
                    (host, parse_port(port)?)
                }
                None => return Err(AddressError::Port(rest.to_string())),
            }
        } else {
            match rest.split_once(':') {
                Some((host, port)) if !port.contains(':') => (host, parse_port(port)?),
                // Bare IPv6 address
                Some(_) => (rest, default_port),
                None => (rest, default_port),
            }
        };

        if host.is_empty() {
            return Err(AddressError::Empty);
        }

        Ok(Self {
            host: host.to_string(),
            port,
            tls,
        })
    }
}

impl std::fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.tls { "ssl" } else { "tcp" };
        write!(f, "{}://{}:{}", scheme, self.host, self.port)
    }
}

fn parse_port(port: &str) -> Result<u16, AddressError> {
    port.parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| AddressError::Port(port.to_string()))
}

/// Subscribed MQTT session with the printer
pub struct PrinterFeed {
    client: AsyncClient,
    eventloop: EventLoop,
    broker: BrokerAddress,
    topic: String,
}

impl PrinterFeed {
    /// Prepare the session. Nothing touches the network until [`run`].
    ///
    /// [`run`]: PrinterFeed::run
    pub fn new(config: &PrinterConfig) -> Result<Self> {
        let broker: BrokerAddress = config
            .address
            .parse()
            .with_context(|| format!("Invalid printer address {:?}", config.address))?;
        let topic = config
            .topic()
            .context("No MQTT topic configured (set printer.serial or printer.mqtt_topic)")?;

        let mut options = MqttOptions::new(&config.client_id, &broker.host, broker.port);
        options
            .set_credentials(&config.username, &config.access_code)
            .set_keep_alive(KEEP_ALIVE)
            .set_max_packet_size(MAX_INCOMING_PACKET, MAX_OUTGOING_PACKET);

        if broker.tls {
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
                Arc::new(printer_tls_config()),
            )));
        }

        let (client, eventloop) = AsyncClient::new(options, 10);

        Ok(Self {
            client,
            eventloop,
            broker,
            topic,
        })
    }

    /// Drive the session, feeding every publish to `pipeline`.
    ///
    /// Only returns on error. Failing to reach the printer before the first
    /// CONNACK is fatal; later disconnects are retried after a short delay
    /// and the topic is subscribed again on every reconnect.
    pub async fn run(mut self, pipeline: &StatusPipeline) -> Result<()> {
        info!("Connecting to printer at {}", self.broker);
        let mut ever_connected = false;

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("Connected to printer ({:?})", ack.code);
                    ever_connected = true;
                    self.client
                        .try_subscribe(self.topic.as_str(), QoS::AtMostOnce)
                        .map_err(|e| anyhow::anyhow!("Failed to subscribe to {}: {}", self.topic, e))?;
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    info!("Subscribed to {}", self.topic);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!("[{}] {} bytes", publish.topic, publish.payload.len());
                    pipeline.handle_payload(&publish.payload).await;
                }
                Ok(_) => {}
                Err(e) if !ever_connected => {
                    anyhow::bail!("MQTT connect to {} failed: {}", self.broker, e);
                }
                Err(e) => {
                    warn!(
                        "MQTT connection lost: {}; retrying in {:?}",
                        e, RECONNECT_DELAY
                    );
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

/// TLS settings for the printer's LAN broker.
///
/// The printer's certificate is self-signed per device, so it cannot be
/// checked against any root store.
pub fn printer_tls_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(danger::AcceptPrinterCertificate))
        .with_no_client_auth()
}

mod danger {
    use tokio_rustls::rustls;

    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, SignatureScheme};

    #[derive(Debug)]
    pub struct AcceptPrinterCertificate;

    impl ServerCertVerifier for AcceptPrinterCertificate {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            vec![
                SignatureScheme::RSA_PKCS1_SHA256,
                SignatureScheme::RSA_PKCS1_SHA384,
                SignatureScheme::RSA_PKCS1_SHA512,
                SignatureScheme::ECDSA_NISTP256_SHA256,
                SignatureScheme::ECDSA_NISTP384_SHA384,
                SignatureScheme::RSA_PSS_SHA256,
                SignatureScheme::RSA_PSS_SHA384,
                SignatureScheme::RSA_PSS_SHA512,
                SignatureScheme::ED25519,
            ]
        }
    }
}
