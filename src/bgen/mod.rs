pub mod bgen_stream;
pub mod compression;
pub mod endian;
pub mod header;
pub mod probability;
pub mod variant_data;
