//! A whole debugging session: config, engine, adapter and transport.

use std::time::Duration;

use lookout_adapter::{AdapterOptions, CdpHandler};
use lookout_config::load_from_str;
use lookout_engine::EngineThread;
use lookout_protocol::{encode_message, FrameDecoder};
use lookout_server::serve_connection;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

struct Client {
    read: ReadHalf<DuplexStream>,
    write: WriteHalf<DuplexStream>,
    decoder: FrameDecoder,
    unclaimed: Vec<Value>,
}

impl Client {
    async fn send(&mut self, id: i64, method: &str, params: Value) {
        let body = json!({ "id": id, "method": method, "params": params }).to_string();
        self.write.write_all(&encode_message(&body)).await.unwrap();
    }

    async fn wait_for(&mut self, pred: impl Fn(&Value) -> bool) -> Value {
        if let Some(index) = self.unclaimed.iter().position(&pred) {
            return self.unclaimed.remove(index);
        }
        let mut buf = [0u8; 4096];
        loop {
            while let Some(text) = self.decoder.next_frame().unwrap() {
                let message: Value = serde_json::from_str(&text).unwrap();
                if pred(&message) {
                    return message;
                }
                self.unclaimed.push(message);
            }
            let n = tokio::time::timeout(Duration::from_secs(5), self.read.read(&mut buf))
                .await
                .expect("timed out waiting for the adapter")
                .unwrap();
            assert!(n > 0, "connection closed");
            self.decoder.push(&buf[..n]);
        }
    }

    async fn request(&mut self, id: i64, method: &str, params: Value) -> Value {
        self.send(id, method, params).await;
        self.wait_for(|m| m["id"] == id).await
    }
}

#[tokio::test]
async fn session_pauses_inspects_and_resumes() {
    let config = load_from_str("[adapter]\ntitle = \"session test\"\n").unwrap();
    let options = AdapterOptions {
        title: config.adapter.title.clone(),
        ..AdapterOptions::default()
    };

    let engine = EngineThread::spawn();
    let runtime = engine.handle();
    let handler = engine
        .with_engine(move |e| CdpHandler::new(e, runtime, options))
        .unwrap()
        .unwrap();

    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_stream);
    let (read, write) = tokio::io::split(client_stream);
    let mut client = Client {
        read,
        write,
        decoder: FrameDecoder::new(),
        unclaimed: Vec::new(),
    };

    let engine_ref = &engine;
    let session = async move {
        let enabled = client.request(1, "Runtime.enable", json!({})).await;
        assert_eq!(enabled["result"], json!({}));
        let context = client
            .wait_for(|m| m["method"] == "Runtime.executionContextCreated")
            .await;
        assert_eq!(context["params"]["context"]["name"], "session test");

        client.request(2, "Debugger.enable", json!({})).await;

        let script = engine_ref.run_script(
            "var total = 10\nconsole.log('total', total)\ndebugger\nvar done = true\n",
            "app.js",
        );

        let parsed = client
            .wait_for(|m| m["method"] == "Debugger.scriptParsed")
            .await;
        assert_eq!(parsed["params"]["url"], "app.js");

        let logged = client
            .wait_for(|m| m["method"] == "Runtime.consoleAPICalled")
            .await;
        assert_eq!(logged["params"]["type"], "log");
        assert_eq!(logged["params"]["args"][1]["value"].as_f64(), Some(10.0));

        let paused = client.wait_for(|m| m["method"] == "Debugger.paused").await;
        assert_eq!(
            paused["params"]["callFrames"][0]["location"]["lineNumber"],
            2
        );

        let evaluated = client
            .request(
                3,
                "Debugger.evaluateOnCallFrame",
                json!({ "callFrameId": "0", "expression": "total * 3" }),
            )
            .await;
        assert_eq!(evaluated["result"]["result"]["value"].as_f64(), Some(30.0));

        client.request(4, "Debugger.resume", json!({})).await;
        client.wait_for(|m| m["method"] == "Debugger.resumed").await;

        let outcome = tokio::task::spawn_blocking(move || {
            script.recv_timeout(Duration::from_secs(5))
        })
        .await
        .unwrap();
        assert!(outcome.unwrap().is_ok());

        // Closing the client ends the connection.
        drop(client);
    };

    let (served, ()) = tokio::join!(
        serve_connection(server_read, server_write, &handler),
        session
    );
    assert!(served.is_ok());
}
