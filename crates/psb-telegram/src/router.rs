use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use psb_core::{
    config::Config, feed::PostBuffer, pipeline::UpdateService, ports::MessagingPort,
    scheduler::UpdateScheduler,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub service: Arc<UpdateService>,
    pub feed: Arc<PostBuffer>,
    pub messenger: Arc<dyn MessagingPort>,
    pub scheduler: Option<UpdateScheduler>,
}

pub async fn run_polling(
    cfg: Arc<Config>,
    service: Arc<UpdateService>,
    feed: Arc<PostBuffer>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!("psb started: @{}", me.username()),
        Err(e) => tracing::warn!("get_me failed: {e}"),
    }
    tracing::info!(
        allowed_users = cfg.telegram_allowed_users.len(),
        cached_channels = feed.channels().len(),
        "bot configuration loaded"
    );

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));

    let scheduler = if cfg.scheduler_enabled {
        let s = UpdateScheduler::new(service.clone(), Some(messenger.clone()), &cfg.update_cron)?;
        s.start().await;
        Some(s)
    } else {
        tracing::info!("scheduler disabled");
        None
    };

    let state = Arc::new(AppState {
        cfg,
        service,
        feed,
        messenger,
        scheduler: scheduler.clone(),
    });

    let handler = dptree::entry()
        .branch(Update::filter_channel_post().endpoint(handlers::handle_channel_post))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    if let Some(s) = scheduler {
        s.stop().await;
    }
    tracing::info!("psb stopped");

    Ok(())
}
