/*
 * This file is part of the Obvia ERP.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use crate::app::config::AppConfig;
use crate::app::database::DatabaseMigrator;
use crate::common::{ConfigProvider, DefaultAppState};
use crate::health::prober::spawn_prober;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

pub fn init_subscriber() {
    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(Level::TRACE) //TODO: make configurable
            .finish(),
    )
    .expect("setting default subscriber failed");
}

/// Wires the dependency bag, runs migrations, spawns the background workers
/// (reconciler and health prober run for the life of the process, outside
/// the request path — see SPEC_FULL §4.5/§4.6) and assembles the router.
/// The reconciler is spawned inside [`DefaultAppState::new`] itself, since
/// its `ReconcileHandle` is a field every request handler needs; only the
/// health prober, which only ever needs the finished `AppState`, is spawned
/// here.
pub async fn init_default_app() -> Result<(Arc<AppConfig>, Router)> {
    let app_state = Arc::new(DefaultAppState::new().await?);
    app_state.migrate().await?;

    spawn_prober(app_state.clone());

    Ok((
        app_state.config(),
        Router::new()
            .nest(
                "/api",
                Router::new()
                    .merge(crate::auth::routes::routes(app_state.clone()))
                    .merge(crate::instances::routes::routes(app_state.clone()))
                    .merge(crate::billing::routes::routes(app_state.clone())),
            )
            .layer(TraceLayer::new_for_http()),
    ))
}
