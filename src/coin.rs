pub mod controller;
pub mod coordinator;
pub mod guard;
pub mod in_memory;
pub mod model;
pub mod repo;
pub mod repository;
pub mod service;
