mod resources;
mod support;
