pub(crate) mod email;
pub(crate) mod integer32;
pub(crate) mod order;
pub(crate) mod password;
pub(crate) mod subdomain;
pub(crate) mod value_object;

pub(crate) use email::Email;
pub(crate) use integer32::Integer32;
pub(crate) use order::Order;
pub(crate) use password::Password;
pub(crate) use subdomain::Subdomain;
pub(crate) use value_object::ValueObject;
pub(crate) use value_object::ValueObjectable;
