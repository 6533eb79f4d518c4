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

use super::handler::{federated, login, logout, signup};
use crate::common::DefaultAppState;
use axum::{Router, routing::post};
use std::sync::Arc;

pub fn routes(app_state: Arc<DefaultAppState>) -> Router {
    Router::new().nest(
        "/auth",
        Router::new()
            .route("/signup", post(signup))
            .route("/login", post(login))
            .route("/federated", post(federated))
            .route("/logout", post(logout))
            .with_state(app_state),
    )
}
