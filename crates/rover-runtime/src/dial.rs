//! Remote dial policy.
//!
//! The manager never opens transports itself; it assembles a
//! [`DialOptions`] value from the remote's configuration and the
//! manager options, then hands it to the external [`RemoteDialer`].
//! Keeping the policy as plain data makes every security-relevant rule
//! testable without a network:
//!
//! - credentials are **explicitly cleared** when the remote config
//!   carries none, so ambient credentials are never leaked to a remote
//! - credential downgrade over an insecure transport requires the
//!   manager-level opt-in
//! - managed robots strip auth material from multicast-DNS discovery

use crate::config::{Credentials, RemoteConfig};
use crate::manager::ResourceManagerOptions;
use async_trait::async_trait;
use rover_resource::RemoteRobot;
use rover_types::ErrorCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// TLS material injected into a dial, opaque to the manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub server_name: Option<String>,
    pub root_certificates_pem: Option<String>,
}

/// Credentials paired with the entity they authenticate as.
///
/// The default value (empty entity, empty credentials) is meaningful:
/// it instructs the dialer to present *nothing*, overriding any ambient
/// credentials it might otherwise pick up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityCredentials {
    pub entity: String,
    pub credentials: Credentials,
}

/// External auth endpoint options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalAuthOptions {
    pub address: String,
    pub to_entity: Option<String>,
    pub insecure: bool,
}

/// WebRTC signaling options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebRtcOptions {
    pub signaling_server_address: String,
    pub signaling_auth_entity: Option<String>,
    pub signaling_credentials: Option<Credentials>,
}

/// Everything a dialer needs to reach one remote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialOptions {
    pub debug: bool,
    pub insecure: bool,
    /// Permit credential downgrade when the transport is insecure.
    pub allow_insecure_creds_downgrade: bool,
    pub tls: Option<TlsConfig>,
    /// Always `Some`: either the configured credentials or the explicit
    /// empty entry that clears ambient credentials.
    pub credentials: Option<EntityCredentials>,
    pub external_auth: Option<ExternalAuthOptions>,
    pub webrtc: Option<WebRtcOptions>,
    /// Strip auth material from multicast-DNS discovery (managed robots).
    pub mdns_remove_auth_credentials: bool,
}

/// Assembles dial options for one remote from its config and the
/// manager options.
#[must_use]
pub fn remote_dial_options(remote: &RemoteConfig, opts: &ResourceManagerOptions) -> DialOptions {
    let mut dial = DialOptions {
        debug: opts.debug,
        insecure: remote.insecure,
        allow_insecure_creds_downgrade: opts.allow_insecure_creds,
        tls: opts.tls.clone(),
        ..DialOptions::default()
    };

    dial.credentials = match &remote.auth.credentials {
        Some(creds) => Some(EntityCredentials {
            entity: remote.auth.entity.clone().unwrap_or_default(),
            credentials: creds.clone(),
        }),
        // Explicitly unset credentials so ambient ones are never fed to
        // remotes unintentionally.
        None => Some(EntityCredentials::default()),
    };

    if let Some(address) = &remote.auth.external_auth_address {
        dial.external_auth = Some(ExternalAuthOptions {
            address: address.clone(),
            to_entity: remote.auth.external_auth_to_entity.clone(),
            insecure: remote.auth.external_auth_insecure,
        });
    }

    if let Some(signaling) = &remote.auth.signaling_server_address {
        dial.webrtc = Some(WebRtcOptions {
            signaling_server_address: signaling.clone(),
            signaling_auth_entity: remote.auth.signaling_auth_entity.clone(),
            signaling_credentials: remote.auth.signaling_credentials.clone(),
        });
        if remote.auth.managed {
            dial.mdns_remove_auth_credentials = true;
        }
    }

    dial
}

/// Dial failure reported by the transport layer.
#[derive(Debug, Clone, Error)]
pub enum DialError {
    /// Credentials would cross an insecure transport without the
    /// explicit downgrade opt-in.
    #[error("refusing to send credentials over an insecure transport without an explicit downgrade")]
    InsecureWithCredentials,

    /// The remote could not be reached.
    #[error("couldn't connect to robot remote ({address}): {reason}")]
    ConnectionFailed { address: String, reason: String },

    /// The dial was canceled.
    #[error("dial canceled")]
    Canceled,
}

impl ErrorCode for DialError {
    fn code(&self) -> &'static str {
        match self {
            Self::InsecureWithCredentials => "DIAL_INSECURE_WITH_CREDENTIALS",
            Self::ConnectionFailed { .. } => "DIAL_CONNECTION_FAILED",
            Self::Canceled => "DIAL_CANCELED",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::InsecureWithCredentials => false,
            Self::ConnectionFailed { .. } | Self::Canceled => true,
        }
    }
}

/// The transport seam: something that can turn a remote config plus
/// dial options into a connected [`RemoteRobot`].
#[async_trait]
pub trait RemoteDialer: Send + Sync {
    async fn dial(
        &self,
        remote: &RemoteConfig,
        opts: DialOptions,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn RemoteRobot>, DialError>;
}
