use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::Parser;
use tinta::{HighlightOptions, HtmlRenderer, Options, Registry, TreeVisitor};

#[derive(Parser)]
#[command(name = "tinta-cli")]
#[command(about = "Highlights a file to HTML with JSON grammars")]
struct Args {
    /// JSON grammar to register, named after its file stem
    #[arg(short, long = "grammar", required = true)]
    grammars: Vec<PathBuf>,

    /// Language to highlight with. Detected among the registered ones if missing
    #[arg(short, long)]
    language: Option<String>,

    /// JSON file with the options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep going when an illegal lexeme is found
    #[arg(long)]
    ignore_illegals: bool,

    /// Prints the scope tree instead of HTML
    #[arg(long)]
    tree: bool,

    /// File to highlight, stdin if missing
    file: Option<PathBuf>,
}

/// Prints one line per node, indented by depth
struct TreePrinter {
    depth: usize,
}

impl TreeVisitor for TreePrinter {
    fn text(&mut self, text: &str) {
        println!("{}{:?}", "  ".repeat(self.depth), text);
    }

    fn open(&mut self, node: &tinta::ScopeNode) {
        if let Some(scope) = &node.scope {
            println!("{}{}", "  ".repeat(self.depth), scope);
            self.depth += 1;
        }
    }

    fn close(&mut self, node: &tinta::ScopeNode) {
        if node.scope.is_some() {
            self.depth -= 1;
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let options = match &args.config {
        Some(path) => Options::load_from_file(path)?,
        None => Options::default(),
    };
    let mut registry = Registry::new(options);
    for path in &args.grammars {
        if let Err(e) = registry.add_language_from_path(path) {
            eprintln!("✗ Failed to load grammar {}: {}", path.display(), e);
        }
    }

    let code = match &args.file {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut code = String::new();
            io::stdin().read_to_string(&mut code)?;
            code
        }
    };

    let result = match &args.language {
        Some(language) => registry.highlight(
            &code,
            HighlightOptions::new(language).ignore_illegals(args.ignore_illegals),
        )?,
        None => registry.highlight_auto(&code, None)?,
    };

    if args.tree {
        result.emitter.walk(&mut TreePrinter { depth: 0 });
    } else {
        let mut renderer = HtmlRenderer::new(&registry.options().class_prefix);
        result.emitter.walk(&mut renderer);
        println!("{}", renderer.finish());
    }

    eprintln!("language: {} (relevance {})", result.language, result.relevance);
    if let Some(second) = &result.second_best {
        eprintln!("second best: {} (relevance {})", second.language, second.relevance);
    }
    if let Some(illegal) = &result.illegal_by {
        eprintln!("stopped on an illegal lexeme: {}", illegal.message);
    }
    Ok(())
}
