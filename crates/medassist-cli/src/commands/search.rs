//! Direct retrieval commands

use crate::app::{OutputFormat, SearchArgs, SearchTarget};
use crate::commands::build_retrieval;
use crate::output;
use anyhow::Result;
use medassist_core::Config;

pub async fn run(args: SearchArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let query = args.query.join(" ");
    let retrieval = build_retrieval(config)?;

    let rendered = match args.target {
        SearchTarget::Knowledge => {
            let (items, _) = retrieval.search_knowledge_base(&query).await?;
            output::format_knowledge(&items, format)
        }
        SearchTarget::Doctors => {
            let (items, _) = retrieval.search_doctors(&query).await?;
            output::format_doctors(&items, format)
        }
    };

    print!("{}", rendered);
    Ok(())
}
