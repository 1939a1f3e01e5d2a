pub mod dashboard;
pub mod entry_screen;

#[cfg(test)]
pub(crate) mod test_support;
