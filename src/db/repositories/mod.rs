pub mod evidence;
pub mod findings;
