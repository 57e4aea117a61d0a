pub mod fare;
pub mod lifecycle;
pub mod marketplace;
pub mod tracker;

#[cfg(test)]
pub mod test_support;
