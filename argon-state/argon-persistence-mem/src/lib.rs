mod db;
mod trait_impl;

pub use db::InMemoryStateDb;
