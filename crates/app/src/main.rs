use anyhow::{anyhow, Result};
use chat_host::{gemini_factory, ChatService, EffectSurface};
use eframe::egui;
use services::Database;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod audio;
mod modals;
mod panels;
mod portrait;
mod simple_md;
mod state;
mod surface;
mod types;

use audio::AudioPlayer;
use surface::UiSurface;
use types::AppState;

const DEFAULT_LOG_FILTER: &str = "info,chat_host=debug";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("aphrodisiac-worker")
        .build()?;
    // Reveals and dispatches are started from the UI thread
    let _guard = runtime.enter();

    let data_dir = Database::default_data_dir();
    let db = Database::open(&data_dir)?;
    tracing::info!("Using data directory {}", data_dir.display());

    let (surface, portrait_rx) = UiSurface::new(AudioPlayer::spawn());
    let (render_tx, render_rx) = tokio::sync::mpsc::unbounded_channel();
    let service = Arc::new(ChatService::new(
        db,
        surface.clone() as Arc<dyn EffectSurface>,
        render_tx,
        gemini_factory(),
    )?);
    let handle = runtime.handle().clone();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 760.0])
            .with_min_inner_size([760.0, 520.0]),
        vsync: true,
        ..Default::default()
    };
    eframe::run_native(
        "Aphrodisiac",
        options,
        Box::new(move |cc| {
            surface.attach(cc.egui_ctx.clone());
            Box::new(AphrodisiacApp {
                state: AppState::new(cc.egui_ctx.clone(), service, handle, render_rx, portrait_rx),
            })
        }),
    )
    .map_err(|e| anyhow!("UI failed: {}", e))
}

struct AphrodisiacApp {
    state: AppState,
}

impl eframe::App for AphrodisiacApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let s = &mut self.state;
        s.poll();

        // Keep polling while replies stream or portraits fade
        if s.is_revealing() || !s.pending_chats.is_empty() || s.portraits.any_fading() {
            ctx.request_repaint();
        }

        let mut actions = Vec::new();
        panels::header(s, ctx, &mut actions);
        panels::sidebar(s, ctx, &mut actions);
        panels::input_bar(s, ctx, &mut actions);
        panels::chat_view(s, ctx, &mut actions);
        s.show_modals(ctx);

        for action in actions {
            s.apply(action);
        }
    }
}
