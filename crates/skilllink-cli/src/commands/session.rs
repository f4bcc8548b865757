//! Session commands.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use skilllink_core::{ProviderKey, ResourceId, Role};

use super::ApiClient;

#[derive(Debug, Deserialize)]
struct SessionInfo {
    #[serde(default)]
    token: Option<String>,
    actor_id: ResourceId,
    role: Option<Role>,
    expires_at: String,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    assertion: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
}

fn print_session(session: &SessionInfo) {
    println!("Actor:   {}", session.actor_id);
    match session.role {
        Some(role) => println!("Role:    {}", role),
        None => println!("Role:    (not chosen; run `skilllink role <client|technician>`)"),
    }
    println!("Expires: {}", session.expires_at);
}

/// Where the sign-in assertion comes from.
#[derive(Debug)]
pub enum Credential {
    /// An assertion handed out by the auth provider.
    Assertion(String),
    /// Sign an assertion locally with the provider key, for development setups
    /// where the CLI stands in for the provider.
    ProviderKey { actor: ResourceId, key: String },
}

impl Credential {
    pub fn from_args(
        assertion: Option<String>,
        actor: Option<ResourceId>,
        provider_key: Option<String>,
    ) -> Result<Self> {
        match (assertion, actor, provider_key) {
            (Some(assertion), None, _) => Ok(Self::Assertion(assertion)),
            (None, Some(actor), Some(key)) => Ok(Self::ProviderKey { actor, key }),
            (None, Some(_), None) => {
                bail!("--actor needs --provider-key or SKILLLINK_PROVIDER_KEY")
            }
            (Some(_), Some(_), _) => bail!("pass either --assertion or --actor, not both"),
            (None, None, _) => bail!("pass --assertion, or --actor with a provider key"),
        }
    }

    fn assertion(self) -> Result<String> {
        match self {
            Self::Assertion(assertion) => Ok(assertion),
            Self::ProviderKey { actor, key } => ProviderKey::new(key)
                .and_then(|key| key.sign(actor, Utc::now()))
                .context("could not sign a sign-in assertion"),
        }
    }
}

pub async fn login(client: &ApiClient, credential: Credential, role: Option<Role>) -> Result<()> {
    let assertion = credential.assertion()?;
    let session: SessionInfo = client
        .post(
            "auth/sessions",
            &LoginRequest {
                assertion: &assertion,
                role,
            },
        )
        .await?;
    let token = session
        .token
        .as_deref()
        .context("server did not return a session token")?;

    print_session(&session);
    println!();
    println!("export SKILLLINK_TOKEN={}", token);
    Ok(())
}

pub async fn select_role(client: &ApiClient, role: Role) -> Result<()> {
    let session: SessionInfo = client
        .put("auth/sessions/current/role", &json!({ "role": role }))
        .await?;
    print_session(&session);
    Ok(())
}

pub async fn whoami(client: &ApiClient) -> Result<()> {
    let session: SessionInfo = client.get("auth/sessions/current").await?;
    print_session(&session);
    Ok(())
}

pub async fn logout(client: &ApiClient) -> Result<()> {
    client.delete("auth/sessions/current").await?;
    println!("Signed out");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_from_args() {
        let actor = ResourceId::new();
        let key = "dev-provider-key-0123456789".to_string();

        assert!(matches!(
            Credential::from_args(Some("a.b.c".into()), None, Some(key.clone())).unwrap(),
            Credential::Assertion(a) if a == "a.b.c"
        ));
        assert!(matches!(
            Credential::from_args(None, Some(actor), Some(key.clone())).unwrap(),
            Credential::ProviderKey { actor: a, .. } if a == actor
        ));
        assert!(Credential::from_args(None, Some(actor), None).is_err());
        assert!(Credential::from_args(Some("a.b.c".into()), Some(actor), None).is_err());
        assert!(Credential::from_args(None, None, Some(key)).is_err());
    }

    #[test]
    fn test_locally_signed_assertion_verifies_with_same_key() {
        let actor = ResourceId::new();
        let key = "dev-provider-key-0123456789";
        let assertion = Credential::ProviderKey {
            actor,
            key: key.to_string(),
        }
        .assertion()
        .unwrap();
        let verified = ProviderKey::new(key)
            .unwrap()
            .verify(&assertion, Utc::now())
            .unwrap();
        assert_eq!(verified, actor);

        let short = Credential::ProviderKey {
            actor,
            key: "short".to_string(),
        };
        assert!(short.assertion().is_err());
    }
}
