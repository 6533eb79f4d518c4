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

/// The Tenant entity: the billable identity a signup/login/billing-webhook
/// ultimately resolves to. No HTTP surface of its own — `auth` creates and
/// looks tenants up at signup/login, `billing` updates the billing link,
/// `instances` reads tenant-id off the session to resolve "my instance".
pub(crate) mod model;
pub(crate) mod repository;

