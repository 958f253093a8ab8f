use clap::Args;
use utoipa::OpenApi;

#[derive(Args)]
pub struct OpenApiCommand {
    /// Pretty-print the document
    #[arg(long)]
    pub pretty: bool,
}

impl OpenApiCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let doc = tops_acme::AcmeApiDoc::openapi();
        let out = if self.pretty {
            doc.to_pretty_json()?
        } else {
            doc.to_json()?
        };
        println!("{}", out);
        Ok(())
    }
}
