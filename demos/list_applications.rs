use std::io;

use vonage::{ApiResource, Basic, Client, Params};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let key = std::env::var("VONAGE_API_KEY").map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "VONAGE_API_KEY environment variable is required",
        )
    })?;
    let secret = std::env::var("VONAGE_API_SECRET").map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "VONAGE_API_SECRET environment variable is required",
        )
    })?;

    let client = Client::new(Basic::new(key, secret)?);
    let applications = ApiResource::new(client.clone(), format!("{}v2/applications", client.api_url()))
        .with_collection("applications")
        .hal(true);

    let mut filter = Params::new();
    filter.insert("page_size".to_owned(), 10.into());

    let mut pager = applications.search(filter);
    while let Some(page) = pager.next_page().await? {
        for application in &page.items {
            println!(
                "{} {}",
                application["id"].as_str().unwrap_or("?"),
                application["name"].as_str().unwrap_or("?")
            );
        }
    }

    Ok(())
}
