//! Serves the current bundle of a pass, honouring `If-None-Match`.

use stampcard_render::{Rgb, StampRenderer, StampVisual};
use tracing::{debug, instrument};

use super::bundle::{PassBundle, PassIdentity, build_bundle};
use super::manifest::etag_matches;
use super::ProtocolError;
use crate::catalog::OfferCatalog;
use crate::registry::authenticate;
use crate::storage::{Pass, PassDatabase, WalletKind};

/// Response to a pass content request.
#[derive(Debug, Clone)]
pub enum PassContent {
    /// The caller's validator is current.
    Unchanged { etag: String },
    Fresh(PassBundle),
}

impl PassContent {
    pub fn etag(&self) -> &str {
        match self {
            Self::Unchanged { etag } => etag,
            Self::Fresh(bundle) => &bundle.etag,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PassContentService {
    db: PassDatabase,
    renderer: StampRenderer,
    catalog: OfferCatalog,
    identity: PassIdentity,
}

impl PassContentService {
    pub const fn new(
        db: PassDatabase,
        renderer: StampRenderer,
        catalog: OfferCatalog,
        identity: PassIdentity,
    ) -> Self {
        Self {
            db,
            renderer,
            catalog,
            identity,
        }
    }

    pub const fn identity(&self) -> &PassIdentity {
        &self.identity
    }

    /// Build the bundle for an authenticated pass.
    ///
    /// Returns [`PassContent::Unchanged`] when `if_none_match` already
    /// names the current validator.
    #[instrument(skip(self, token, if_none_match))]
    pub async fn pass_content(
        &self,
        pass_id: &str,
        token: &str,
        if_none_match: Option<&str>,
    ) -> Result<PassContent, ProtocolError> {
        let pass = authenticate(&self.db, pass_id, token).await?;
        let bundle = self.build(&pass).await;

        if if_none_match.is_some_and(|v| etag_matches(v, &bundle.etag)) {
            debug!(pass_id, etag = %bundle.etag, "Pass unchanged");
            return Ok(PassContent::Unchanged { etag: bundle.etag });
        }

        Ok(PassContent::Fresh(bundle))
    }

    async fn build(&self, pass: &Pass) -> PassBundle {
        let design = self.catalog.design_for(&pass.offer_id);
        let wallet = pass.wallet().unwrap_or(WalletKind::Apple);
        let defaults = stampcard_core::config::OfferDesign::default();

        let visual = StampVisual::new(
            design.icon_id.clone(),
            clamp_count(pass.earned_count),
            clamp_count(pass.required_count),
            self.renderer.profile(wallet.canvas_kind()),
        )
        .with_colors(
            Rgb::parse_or(
                &design.background_color,
                Rgb::parse_or(&defaults.background_color, Rgb::BLACK),
            ),
            Rgb::parse_or(
                &design.foreground_color,
                Rgb::parse_or(&defaults.foreground_color, Rgb::WHITE),
            ),
        )
        .with_display_mode(design.display_mode)
        .with_background_url(design.background_image_url.clone())
        .with_logo_url(design.logo_url.clone());

        let image = self.renderer.render_remote(visual).await;
        build_bundle(pass, &design, &self.identity, &image)
    }
}

fn clamp_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::storage::NewPass;
    use stampcard_core::config::ServerConfig;

    const TOKEN: &str = "0123456789abcdef0123456789abcdef";

    async fn service() -> (PassDatabase, PassContentService) {
        let db = PassDatabase::open_in_memory().await.unwrap();
        db.create_pass(&NewPass {
            id: "p1",
            owner_customer_id: "cust",
            offer_id: "offer",
            wallet_kind: WalletKind::Google,
            required_count: 30,
            authentication_token: TOKEN,
        })
        .await
        .unwrap();
        let svc = PassContentService::new(
            db.clone(),
            StampRenderer::default(),
            OfferCatalog::default(),
            PassIdentity::from(&ServerConfig::default()),
        );
        (db, svc)
    }

    #[tokio::test]
    async fn fresh_then_unchanged() {
        let (_, svc) = service().await;
        let PassContent::Fresh(bundle) = svc.pass_content("p1", TOKEN, None).await.unwrap() else {
            panic!("expected fresh bundle");
        };
        assert!(bundle.file("thumbnail.png").is_some());

        let again = svc
            .pass_content("p1", TOKEN, Some(&bundle.etag))
            .await
            .unwrap();
        assert!(matches!(again, PassContent::Unchanged { ref etag } if *etag == bundle.etag));
    }

    #[tokio::test]
    async fn wrong_token_is_unauthorized() {
        let (_, svc) = service().await;
        assert!(matches!(
            svc.pass_content("p1", "bad", None).await,
            Err(ProtocolError::Unauthorized)
        ));
    }

    #[test]
    fn counts_clamp_into_u32() {
        assert_eq!(clamp_count(-3), 0);
        assert_eq!(clamp_count(7), 7);
        assert_eq!(clamp_count(i64::MAX), u32::MAX);
    }
}
