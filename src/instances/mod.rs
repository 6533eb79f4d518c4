/// The Instance entity and everything that keeps one converged with its
/// desired state: the Store-facing repository, the Runtime/Proxy/Secret
/// Mint adapters, the Reconciler that drives them, and the admin/tenant
/// HTTP surface layered on top (spec §2 "Components").
pub(crate) mod dto;
pub(crate) mod handler;
pub(crate) mod model;
pub(crate) mod proxy;
pub(crate) mod reconciler;
pub(crate) mod repository;
pub mod routes;
pub(crate) mod runtime;
pub(crate) mod secret_mint;
pub(crate) mod service;
