use gradcafe_crawler::Persistent;

#[tokio::main]
async fn main() {
    let name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "gradcafe".to_string());
    let p = Persistent::new(&name).await.unwrap();
    match p.latest_id().await.unwrap() {
        Some(id) => println!("{id}"),
        None => println!("none"),
    }
}
