use std::io;

use vonage::{ApiResource, Basic, Client, ContentType, Params};

fn required_env(name: &str) -> Result<String, io::Error> {
    std::env::var(name).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{name} environment variable is required"),
        )
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let key = required_env("VONAGE_API_KEY")?;
    let secret = required_env("VONAGE_API_SECRET")?;
    let to = required_env("VONAGE_TO")?;
    let text = std::env::var("VONAGE_TEXT")
        .unwrap_or_else(|_| "Hello from the vonage demo.".to_owned());

    let client = Client::new(Basic::new(key, secret)?);
    let sms = ApiResource::new(client.clone(), format!("{}sms/json", client.rest_url()))
        .with_content_type(ContentType::Form)
        .errors_on_200(true);

    let mut message = Params::new();
    message.insert("from".to_owned(), "Vonage".into());
    message.insert("to".to_owned(), to.into());
    message.insert("text".to_owned(), text.into());

    let response = sms.create(message).await?;
    println!(
        "status: {}, elapsed: {:?}, messages: {}",
        response.status,
        response.elapsed,
        response.require_field("messages")?
    );

    Ok(())
}
