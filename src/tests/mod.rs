mod consumer_tests;
mod extension_tests;
mod message_tests;
mod stubs;
mod test_http_client;
