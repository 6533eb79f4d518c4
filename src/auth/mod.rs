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

/// Signup/login/federated-login and the tenant session cookie (spec S6
/// "Tenant-session" surface). Creates and resolves [`crate::tenants`]
/// rows; the instances and billing modules consume the session/tenant-id
/// this module establishes rather than re-implementing it.
pub(crate) mod dto;
pub mod extractors;
pub(crate) mod handler;
pub mod routes;
pub(crate) mod service;
