pub mod evidence;
pub mod sections;
pub mod settings;
