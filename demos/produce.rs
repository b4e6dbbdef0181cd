use std::sync::Arc;
use std::time::Duration;

use kafkacore::client::producer::ProducerRecord;
use kafkacore::client::ClientBuilder;

const TOPIC: &str = "test";

#[tokio::main]
async fn main() {
    let brokers = vec!["localhost:9010".to_string(), "localhost:9011".to_string()];
    let client = Arc::new(ClientBuilder::new(brokers).build().await.unwrap());

    tokio::spawn(produce_to_partition(Arc::clone(&client), 0));
    tokio::spawn(produce_to_partition(Arc::clone(&client), 1));
    tokio::spawn(produce_to_partition(client, 2));

    tokio::time::sleep(Duration::from_secs(10_000)).await;
}

async fn produce_to_partition(client: Arc<kafkacore::Client>, partition: i32) {
    let producer = client.producer();

    let mut index = 0;
    loop {
        let record = ProducerRecord {
            topic: TOPIC.to_string(),
            partition,
            key: None,
            value: Some(format!("hello: {partition} {index}").into_bytes()),
            timestamp: None,
        };

        let result = producer.send(record).await.unwrap();
        index += 1;

        println!("partition: {}, offset: {}", partition, result.offset);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
