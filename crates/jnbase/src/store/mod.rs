mod operations;
mod records;
mod stor;


pub use stor::Store;
