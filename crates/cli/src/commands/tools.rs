//! `rookery tools`: print the tool reference given to the model.

use rookery_tools::ToolRegistry;

pub fn run() {
    let registry = ToolRegistry::builtin();
    println!("{} tools available", registry.len());
    println!();
    print!("{}", registry.format_reference());
}
