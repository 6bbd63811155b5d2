pub mod attribution;
pub mod hashing;
pub mod payload;
