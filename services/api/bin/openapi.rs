use clap::Parser;
use sparc_api::router::ApiDoc;
use utoipa::OpenApi;

/// Writes the REST API's OpenAPI document.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Where to write the document.
    #[arg(short, long, default_value = "openapi.json")]
    output: String,
}

/// Generates the OpenAPI specification and writes it to a file.
fn generate_spec(
    api_doc: utoipa::openapi::OpenApi,
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec_json = api_doc.to_pretty_json()?;
    std::fs::write(path, spec_json)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    generate_spec(ApiDoc::openapi(), &args.output)?;
    Ok(())
}
