use crate::cli::TemplateArgs;
use crate::config::defaults;
use crate::error::{CliError, Result};
use tracing::info;

pub fn run(args: TemplateArgs) -> Result<()> {
    let content = defaults::template(args.model);

    let Some(path) = args.output else {
        print!("{content}");
        return Ok(());
    };
    if path.exists() && !args.force {
        return Err(CliError::Argument(format!(
            "'{}' already exists. Use --force to overwrite it.",
            path.display()
        )));
    }
    std::fs::write(&path, content)?;
    info!("Template written to {:?}", &path);
    println!("✓ Configuration template written to: {}", path.display());
    Ok(())
}
