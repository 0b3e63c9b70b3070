//! `consul-ingress init`: write the built-in route template to a file.
//!
//! The written file is a starting point for `--template`; it renders
//! exactly what the built-in default renders.

use crate::cli::InitArgs;
use crate::error::IngressError;
use crate::render::BUILTIN_TEMPLATE;

pub fn execute(args: &InitArgs) -> Result<(), IngressError> {
    let output = &args.output;

    if output.exists() {
        return Err(IngressError::FileExists {
            path: output.clone(),
        });
    }

    std::fs::write(output, BUILTIN_TEMPLATE)?;
    println!("Created {}", output.display());
    println!("Use it with: consul-ingress run --template {}", output.display());
    Ok(())
}
