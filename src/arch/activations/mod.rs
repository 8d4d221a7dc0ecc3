mod act_fn;
mod name;

pub use act_fn::ActFn;
