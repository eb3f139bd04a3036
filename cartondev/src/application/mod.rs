pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use carton_core::error::Result;

pub fn run(cli: Cli) -> Result<()> {
    let opts = handlers::load_options(cli.config.as_deref())?;
    match cli.command {
        Commands::Create {
            out,
            inputs,
            format,
            compression,
            deterministic,
        } => handlers::handle_create(opts, out, inputs, format, compression, deterministic),
        Commands::Extract { archive, dest } => handlers::handle_extract(opts, archive, dest),
        Commands::List {
            archive,
            long,
            json,
        } => handlers::handle_list(opts, archive, long, json),
        Commands::Cat { archive, entry } => handlers::handle_cat(opts, archive, entry),
        Commands::Compress {
            source,
            dest,
            compression,
            level,
        } => handlers::handle_compress(opts, source, dest, compression, level),
        Commands::Decompress { source, dest } => handlers::handle_decompress(source, dest),
        Commands::Codecs => handlers::handle_codecs(),
    }
}
