// Frontier is an embedded crawl frontier for web crawlers.
// Copyright (C) 2024 Stract ApS
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use frontier::page_db::HashInfoStream;
use frontier::{BfScheduler, FreqScheduler, PageDb};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump every page record of the database.
    InfoDump {
        page_db: PathBuf,
        /// Output file; stdout when omitted.
        output: Option<PathBuf>,
    },

    /// Dump the link graph as a compressed edge container.
    LinksDump { page_db: PathBuf, output: PathBuf },

    /// Print every page whose URL matches a regular expression.
    Find { page_db: PathBuf, pattern: String },

    /// Walk backwards through the pages that link to the given page hash.
    Backlinks {
        page_db: PathBuf,
        /// Page hash in hex, as printed by the dump tools.
        hash: String,
    },

    /// Rebuild a best-first schedule from its page database.
    BfReload { page_db: PathBuf },

    /// Dump a frequency schedule.
    FreqDump {
        page_db: PathBuf,
        /// Output file; stdout when omitted.
        output: Option<PathBuf>,
    },
}

fn open_page_db(path: &PathBuf) -> Result<Arc<PageDb>> {
    let db = PageDb::open(path)
        .with_context(|| format!("opening page database at {}", path.display()))?;
    db.set_persist(true);
    Ok(Arc::new(db))
}

fn with_output<F>(output: Option<PathBuf>, f: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    match output {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("creating output file {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            f(&mut writer)?;
            writer.flush()?;
            Ok(())
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            f(&mut lock)
        }
    }
}

fn backlinks(db: &PageDb, start: &str) -> Result<()> {
    let hash = u64::from_str_radix(start.trim_start_matches("0x"), 16)
        .context("parsing the page hash")?;

    let mut current = match db.get_idx(hash)? {
        Some(idx) => idx,
        None => bail!(frontier::Error::NoPage),
    };

    let mut idx2url = std::collections::HashMap::new();
    let mut stream = HashInfoStream::new(db)?;
    let mut idx_stream = frontier::page_db::HashIdxStream::new(db)?;
    while let (Some((hash, info)), Some((_, idx))) = (stream.next()?, idx_stream.next()?) {
        idx2url.insert(idx, (hash, info.url));
    }

    let mut visited = std::collections::HashSet::new();
    loop {
        match idx2url.get(&current) {
            Some((hash, url)) => println!("{hash:016x} {url}"),
            None => println!("{current:016x} UNKNOWN"),
        }

        if !visited.insert(current) {
            break;
        }
        match db.find_linking_page(current)? {
            Some(parent) => current = parent,
            None => break,
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    match args.command {
        Commands::InfoDump { page_db, output } => {
            let db = open_page_db(&page_db)?;
            with_output(output, |out| db.info_dump(out))?;
        }
        Commands::LinksDump { page_db, output } => {
            let db = open_page_db(&page_db)?;
            let file = File::create(&output)
                .with_context(|| format!("creating output file {}", output.display()))?;
            let mut out = db.links_dump(BufWriter::new(file))?;
            out.flush()?;
        }
        Commands::Find { page_db, pattern } => {
            let db = open_page_db(&page_db)?;
            let re = regex::Regex::new(&pattern).context("parsing the URL pattern")?;

            let mut stream = HashInfoStream::new(&db)?;
            while let Some((hash, info)) = stream.next()? {
                if re.is_match(&info.url) {
                    println!("{hash:016x} {}", info.url);
                }
            }
        }
        Commands::Backlinks { page_db, hash } => {
            let db = open_page_db(&page_db)?;
            backlinks(&db, &hash)?;
        }
        Commands::BfReload { page_db } => {
            let db = open_page_db(&page_db)?;
            let scheduler = BfScheduler::new(Arc::clone(&db))?;
            scheduler.set_persist(true);
            scheduler.reload()?;
            println!("Done");
        }
        Commands::FreqDump { page_db, output } => {
            let db = open_page_db(&page_db)?;
            let config = frontier::config::FreqSchedulerConfig {
                persist: true,
                ..Default::default()
            };
            let scheduler = FreqScheduler::with_config(Arc::clone(&db), config)?;
            with_output(output, |out| scheduler.dump(out))?;
        }
    }

    Ok(())
}
