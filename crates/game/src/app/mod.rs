pub(crate) mod bootstrap;
pub(crate) mod gameplay;
pub(crate) mod loop_runner;
pub(crate) mod sim_loader;
pub(crate) mod world;
