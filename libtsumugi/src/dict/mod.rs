pub mod binary_dict;
pub mod skk;
