pub mod test_ensemble;
pub mod test_layers;
