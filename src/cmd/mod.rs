mod check;
mod render;
mod serve;

pub use check::cmd_check;
pub use render::cmd_render;
pub use serve::cmd_serve;
