//! Configuration for a [`crate::session::Session`].

use std::time::Duration;

use crate::control_packet::LastWill;

/// All the settings required to establish and maintain an MQTT session.
#[derive(Builder, Clone)]
#[builder(pattern = "owned", setter(into), build_fn(validate = "Self::validate"))]
pub struct MqttClientOptions {
    /// Client identifier presented in CONNECT.
    pub(crate) client_id: String,
    /// Username for MQTT authentication.
    #[builder(default = "None")]
    pub(crate) user_name: Option<String>,
    /// Password for MQTT authentication.
    #[builder(default = "None")]
    pub(crate) password: Option<String>,
    /// Max time between communications before a PINGREQ is sent.
    ///
    /// A value of zero disables the keep-alive loop entirely.
    #[builder(default = "Duration::from_secs(60)")]
    pub(crate) keep_alive_period: Duration,
    /// How long to wait for a broker response before an operation fails with
    /// [`crate::error::SessionErrorKind::Timeout`].
    #[builder(default = "Duration::from_secs(30)")]
    pub(crate) default_communication_timeout: Duration,
    /// Last will to register with the broker for this connection.
    #[builder(default = "None")]
    pub(crate) will: Option<LastWill>,
}

impl MqttClientOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(client_id) = &self.client_id {
            if client_id.is_empty() {
                return Err("client_id cannot be empty".to_string());
            }
        }
        Ok(())
    }
}
