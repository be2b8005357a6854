//! Terminal monitor for the feed
//!
//! Connects to a running feed server, optionally subscribes to the
//! tickers given as arguments, and prints every message it receives.
//! Useful for eyeballing the stream during development.
//!
//! Usage: `monitor [TICKER]...` with `FEED_URL` overriding the endpoint.

use anyhow::Context;
use chrono::DateTime;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

fn fmt_time(value: &Value) -> String {
    value
        .as_i64()
        .map(|nanos| {
            DateTime::from_timestamp_nanos(nanos)
                .format("%H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "--:--:--".to_string())
}

fn print_prices(label: &str, message: &Value) {
    let time = fmt_time(&message["timestamp"]);
    println!("[{time}] {label}:");
    if let Some(data) = message["data"].as_object() {
        for (ticker, price) in data {
            println!("  {ticker:<6} {}", price.as_str().unwrap_or("?"));
        }
    }
}

fn print_message(message: &Value) {
    match message["type"].as_str() {
        Some("current_prices") => print_prices("current prices", message),
        Some("price_update") => print_prices("update", message),
        Some("price_alert") => {
            let time = fmt_time(&message["timestamp"]);
            println!(
                "[{time}] ALERT: {}",
                message["message"].as_str().unwrap_or("?")
            );
        }
        Some("subscription_confirmed") => {
            println!("subscribed: {}", message["tickers"]);
        }
        Some("unsubscription_confirmed") => {
            println!("unsubscribed: {}", message["tickers"]);
        }
        Some("price_history") => {
            let ticker = message["ticker"].as_str().unwrap_or("?");
            println!("history for {ticker}:");
            if let Some(points) = message["data"].as_array() {
                for point in points {
                    println!(
                        "  [{}] {} ({}%)",
                        fmt_time(&point["timestamp"]),
                        point["price"].as_str().unwrap_or("?"),
                        point["change_percent"].as_str().unwrap_or("?"),
                    );
                }
            }
        }
        Some("error") => {
            eprintln!("server error: {}", message["message"]);
        }
        _ => println!("unrecognized message: {message}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::var("FEED_URL")
        .unwrap_or_else(|_| "ws://127.0.0.1:8765/ws".to_string());
    let tickers: Vec<String> = std::env::args().skip(1).collect();

    let (socket, _) = connect_async(&url)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    println!("connected to {url}");
    let (mut tx, mut rx) = socket.split();

    if !tickers.is_empty() {
        let subscribe = json!({ "type": "subscribe", "tickers": tickers });
        tx.send(Message::Text(subscribe.to_string().into()))
            .await
            .context("failed to send subscription")?;
    }

    while let Some(frame) = rx.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(message) => print_message(&message),
                Err(error) => eprintln!("bad frame: {error}"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(error) => {
                eprintln!("connection error: {error}");
                break;
            }
        }
    }

    println!("disconnected");
    Ok(())
}
