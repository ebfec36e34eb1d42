pub mod domain;
pub mod infrastructure;
pub mod resource_cache;

#[cfg(test)]
pub(crate) mod test_support;
