//! Delivery of magic links
//!
//! Sending the email is an external, best-effort step: a failure is logged by
//! the caller and never undoes an issued token.

use async_trait::async_trait;

use crate::{Error, crypto::mask_token};

#[async_trait]
pub trait MagicLinkMailer: Send + Sync + 'static {
    async fn send_magic_link(
        &self,
        to: &str,
        magic_link: &str,
        user_name: Option<&str>,
    ) -> Result<(), Error>;
}

/// Development mailer that writes the link to the log instead of sending it.
///
/// The token inside the link is masked.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMailer;

#[async_trait]
impl MagicLinkMailer for TracingMailer {
    async fn send_magic_link(
        &self,
        to: &str,
        magic_link: &str,
        user_name: Option<&str>,
    ) -> Result<(), Error> {
        tracing::info!(
            to = %to,
            user_name = user_name.unwrap_or_default(),
            link = %mask_link(magic_link),
            "Magic link ready for delivery"
        );
        Ok(())
    }
}

/// Mask the `token` query value of a magic link.
pub fn mask_link(link: &str) -> String {
    match link.split_once("token=") {
        Some((prefix, rest)) => {
            let (token, tail) = match rest.find('&') {
                Some(end) => rest.split_at(end),
                None => (rest, ""),
            };
            format!("{prefix}token={}{tail}", mask_token(token))
        }
        None => link.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_link_hides_token() {
        let link = "https://app.test/auth/verify?token=abcdefghijklmnopqrstuvwxyz";
        assert_eq!(
            mask_link(link),
            "https://app.test/auth/verify?token=abcd...wxyz"
        );
    }

    #[test]
    fn test_mask_link_keeps_other_params() {
        let link = "https://app.test/auth/verify?token=abcdefghijklmnopqrstuvwxyz&next=/home";
        assert_eq!(
            mask_link(link),
            "https://app.test/auth/verify?token=abcd...wxyz&next=/home"
        );
    }

    #[test]
    fn test_mask_link_without_token() {
        assert_eq!(mask_link("https://app.test/"), "https://app.test/");
    }

    #[tokio::test]
    async fn test_tracing_mailer_always_succeeds() {
        let result = TracingMailer
            .send_magic_link("a@x.com", "https://app.test/auth/verify?token=abc", None)
            .await;
        assert!(result.is_ok());
    }
}
