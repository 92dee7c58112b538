#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use stampcard_render::compositor::{decode_image, encode_png, solid_fallback};
use stampcard_render::{
    BackgroundFetcher, CanvasProfile, FetchError, IconCache, LayoutStyle, Rgb, StampRenderer,
    StampVisual, compute_layout,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BG: Rgb = Rgb::new(0x10, 0x20, 0x30);
const FG: Rgb = Rgb::new(0xF0, 0xC0, 0x10);

fn remote_renderer(max_bytes: usize) -> StampRenderer {
    let fetcher = BackgroundFetcher::new(Duration::from_secs(2), max_bytes).unwrap();
    StampRenderer::new(Arc::new(IconCache::default()), Some(fetcher))
}

fn pixel(png: &[u8], x: u32, y: u32) -> [u8; 4] {
    decode_image(png).unwrap().to_rgba8().get_pixel(x, y).0
}

#[test]
fn layout_stays_in_bounds_for_first_hundred_counts() {
    for profile in [CanvasProfile::strip(), CanvasProfile::thumbnail()] {
        for count in 1..=100 {
            let plan = compute_layout(count, &profile);
            assert!(
                plan.fits_within(profile.padding),
                "count {count} overflows {}: {plan:?}",
                profile.kind
            );
            assert!(plan.rows * plan.cols >= count, "count {count}: {plan:?}");
            if count >= 6 {
                assert!(plan.cols >= plan.rows, "count {count}: {plan:?}");
            }
            if plan.style == LayoutStyle::Glyphs {
                assert!(plan.cell_size > 0 && plan.cell_size <= profile.max_cell);
            }
        }
    }
}

#[test]
fn layout_is_deterministic() {
    let profile = CanvasProfile::thumbnail();
    for count in [1, 7, 19, 64] {
        assert_eq!(compute_layout(count, &profile), compute_layout(count, &profile));
    }
}

#[test]
fn four_of_ten_marks_cells_in_row_major_order() {
    let renderer = StampRenderer::default();
    let visual = StampVisual::new("stamp", 4, 10, CanvasProfile::strip()).with_colors(BG, FG);
    let image = renderer.render(&visual, None, None);

    let plan = compute_layout(10, &visual.profile);
    assert_eq!((plan.rows, plan.cols), (2, 5));
    for index in 0..10 {
        let (x, y) = plan.cell_center(index);
        let expected = if index < 4 { FG } else { BG };
        assert_eq!(
            pixel(&image.png, x, y),
            [expected.r, expected.g, expected.b, 255],
            "cell {index}"
        );
    }
}

#[tokio::test]
async fn unreachable_background_renders_solid_canvas() {
    let renderer = remote_renderer(1024 * 1024);
    let visual = StampVisual::new("star", 2, 5, CanvasProfile::strip())
        .with_colors(BG, FG)
        .with_background_url(Some("http://127.0.0.1:9/background.png".to_string()));

    let image = renderer.render_remote(visual).await;
    assert_eq!(
        (image.width, image.height),
        (CanvasProfile::STRIP_WIDTH, CanvasProfile::STRIP_HEIGHT)
    );
    assert_eq!(pixel(&image.png, 0, 0), [BG.r, BG.g, BG.b, 255]);
}

#[tokio::test]
async fn fetched_background_is_cover_filled() {
    let server = MockServer::start().await;
    let red = encode_png(&solid_fallback(40, 20, Rgb::new(255, 0, 0))).unwrap();
    Mock::given(method("GET"))
        .and(path("/bg.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(red))
        .mount(&server)
        .await;

    let visual = StampVisual::new("stamp", 1, 3, CanvasProfile::thumbnail())
        .with_colors(BG, FG)
        .with_background_url(Some(format!("{}/bg.png", server.uri())));
    let image = remote_renderer(1024 * 1024).render_remote(visual).await;

    for (x, y) in [(0, 0), (449, 449)] {
        let [r, g, b, a] = pixel(&image.png, x, y);
        assert!(r > 250 && g < 5 && b < 5 && a == 255, "({x},{y}) = {r},{g},{b},{a}");
    }
}

#[tokio::test]
async fn fetcher_rejects_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = BackgroundFetcher::new(Duration::from_secs(2), 1024).unwrap();
    let err = fetcher.fetch(&format!("{}/missing.png", server.uri())).await.unwrap_err();
    assert!(matches!(err, FetchError::Status(404)), "got {err}");
}

#[tokio::test]
async fn fetcher_enforces_byte_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
        .mount(&server)
        .await;

    let fetcher = BackgroundFetcher::new(Duration::from_secs(2), 1024).unwrap();
    let err = fetcher.fetch(&format!("{}/huge.png", server.uri())).await.unwrap_err();
    assert!(matches!(err, FetchError::TooLarge { limit: 1024 }), "got {err}");
    assert!(fetcher.fetch_or_none(&format!("{}/huge.png", server.uri())).await.is_none());
}

#[tokio::test]
async fn oversized_background_falls_back_to_solid() {
    let server = MockServer::start().await;
    let red = encode_png(&solid_fallback(400, 400, Rgb::new(255, 0, 0))).unwrap();
    let cap = red.len() / 2;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(red))
        .mount(&server)
        .await;

    let visual = StampVisual::new("stamp", 0, 1, CanvasProfile::strip())
        .with_colors(BG, FG)
        .with_background_url(Some(format!("{}/bg.png", server.uri())));
    let image = remote_renderer(cap).render_remote(visual).await;
    assert_eq!(pixel(&image.png, 0, 0), [BG.r, BG.g, BG.b, 255]);
}
