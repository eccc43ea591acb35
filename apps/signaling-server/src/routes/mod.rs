pub mod calls;
pub mod presence;
