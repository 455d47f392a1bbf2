use cbfeed::core::config::ExchangeConfig;
use cbfeed::exchanges::coinbase::{BookLevel, CoinbaseBuilder};
use cbfeed::{ChannelHandler, FeedEvent};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Falls back to public market data when COINBASE_* credentials are absent
    let config = ExchangeConfig::from_env_or_read_only("COINBASE")?;
    let builder = CoinbaseBuilder::new()
        .with_config(config)
        .with_default_rest_rate_limit();

    let rest = builder.build_rest()?;

    println!("Fetching products...");
    match rest.get_products().await {
        Ok(products) => {
            println!("Found {} products", products.len());
            for product in products.iter().take(5) {
                println!(
                    "Product: {} ({}->{})",
                    product.id, product.base_currency, product.quote_currency
                );
            }
        }
        Err(e) => println!("Error fetching products: {}", e),
    }

    match rest.get_product_order_book("BTC-USD", BookLevel::Best).await {
        Ok(book) => println!(
            "BTC-USD book at sequence {}: best bid {:?}, best ask {:?}",
            book.sequence,
            book.bids.first().map(|b| b.price),
            book.asks.first().map(|a| a.price)
        ),
        Err(e) => println!("Error fetching order book: {}", e),
    }

    let (handler, mut events) = ChannelHandler::new();
    let handle = builder.build_subscription("BTC-USD", Arc::new(handler))?.spawn();

    let deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => break,
            event = events.recv() => match event {
                Some(FeedEvent::Error(e)) => println!("Feed error: {}", e),
                Some(event) => println!("{}: {:?}", event.kind(), event),
                None => break,
            },
        }
    }

    handle.shutdown().await?;
    Ok(())
}
