use redis_shard::client::{self, Client};
use redis_shard::cluster::{ClusterDatabase, HashRing};
use redis_shard::{server, to_cmd_line, Database, Frame, StandaloneDatabase};

use tokio::net::TcpListener;

struct Node {
    addr: String,
    listener: TcpListener,
}

async fn bind() -> Node {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    Node { addr, listener }
}

/// 두 노드로 된 클러스터를 가동하고 두 노드의 주소를 반환한다.
async fn start_cluster() -> (String, String) {
    let first = bind().await;
    let second = bind().await;
    let addrs = (first.addr.clone(), second.addr.clone());

    for (node, peer) in vec![(first, addrs.1.clone()), (second, addrs.0.clone())] {
        let database = ClusterDatabase::new(node.addr.clone(), vec![peer], StandaloneDatabase::new(16));
        tokio::spawn(async move {
            server::run(
                node.listener,
                Database::Cluster(database),
                250,
                std::future::pending::<()>(),
            )
            .await
        });
    }

    addrs
}

/// 각 노드가 소유한 키를 'per_node'개씩 고른다.
fn keys_per_node(nodes: &[&str], per_node: usize) -> Vec<(String, String)> {
    let mut ring = HashRing::new(None);
    ring.add_nodes(nodes);

    let mut picked: Vec<(String, String)> = Vec::new();
    for i in 0.. {
        let key = format!("key:{}", i);
        let owner = ring.pick_node(key.as_bytes()).unwrap().to_string();
        if picked.iter().filter(|(_, node)| *node == owner).count() < per_node {
            picked.push((key, owner));
        }
        if picked.len() == per_node * nodes.len() {
            break;
        }
    }
    picked
}

/// 라우팅 없이 그 노드의 로컬 샤드만 보는 클라이언트.
async fn shard_client(addr: &str) -> Client {
    let mut client = client::connect(addr).await.unwrap();
    client.announce_peer().await.unwrap();
    client
}

#[tokio::test]
async fn keys_land_on_their_owner() {
    let (a, b) = start_cluster().await;
    let keys = keys_per_node(&[a.as_str(), b.as_str()], 3);

    let mut client = client::connect(a.as_str()).await.unwrap();
    for (key, _) in &keys {
        client.set(key, "v".into()).await.unwrap();
    }

    let mut shard_a = shard_client(&a).await;
    let mut shard_b = shard_client(&b).await;

    for (key, owner) in &keys {
        let (owner_shard, other_shard) = if *owner == a {
            (&mut shard_a, &mut shard_b)
        } else {
            (&mut shard_b, &mut shard_a)
        };
        assert_eq!(owner_shard.get(key).await.unwrap().unwrap(), "v");
        assert_eq!(other_shard.get(key).await.unwrap(), None);
    }

    // 어느 노드로 접속해도 같은 값이 보인다.
    let mut via_b = client::connect(b.as_str()).await.unwrap();
    for (key, _) in &keys {
        assert_eq!(via_b.get(key).await.unwrap().unwrap(), "v");
    }
}

#[tokio::test]
async fn broadcast_commands_aggregate() {
    let (a, b) = start_cluster().await;
    let keys = keys_per_node(&[a.as_str(), b.as_str()], 2);
    let names: Vec<&str> = keys.iter().map(|(key, _)| key.as_str()).collect();

    let mut client = client::connect(b.as_str()).await.unwrap();
    for key in &names {
        client.set(key, "v".into()).await.unwrap();
    }

    let mut exists = vec!["EXISTS"];
    exists.extend(&names);
    assert_eq!(
        client.send(&to_cmd_line(&exists)).await.unwrap(),
        Frame::Integer(4)
    );

    match client.send(&to_cmd_line(&["KEYS", "key:*"])).await.unwrap() {
        Frame::Array(found) => assert_eq!(found.len(), 4),
        frame => panic!("unexpected {:?}", frame),
    }

    let mut to_delete = names.clone();
    to_delete.push("missing");
    assert_eq!(client.del(&to_delete).await.unwrap(), 4);

    client.set(names[0], "v".into()).await.unwrap();
    assert_eq!(
        client.send(&to_cmd_line(&["FLUSHDB"])).await.unwrap(),
        Frame::ok()
    );
    assert_eq!(client.get(names[0]).await.unwrap(), None);
}

#[tokio::test]
async fn relay_keeps_selected_database() {
    let (a, b) = start_cluster().await;
    let keys = keys_per_node(&[a.as_str(), b.as_str()], 1);
    let (remote_key, _) = keys.iter().find(|(_, owner)| *owner == b).unwrap();

    let mut client = client::connect(a.as_str()).await.unwrap();
    client.select(3).await.unwrap();
    client.set(remote_key, "three".into()).await.unwrap();

    let mut shard_b = shard_client(&b).await;
    assert_eq!(shard_b.get(remote_key).await.unwrap(), None);
    shard_b.select(3).await.unwrap();
    assert_eq!(shard_b.get(remote_key).await.unwrap().unwrap(), "three");
}

#[tokio::test]
async fn rename_across_nodes_is_rejected() {
    let (a, b) = start_cluster().await;
    let keys = keys_per_node(&[a.as_str(), b.as_str()], 1);
    let (key_a, _) = keys.iter().find(|(_, owner)| *owner == a).unwrap();
    let (key_b, _) = keys.iter().find(|(_, owner)| *owner == b).unwrap();

    let mut client = client::connect(a.as_str()).await.unwrap();
    client.set(key_a, "v".into()).await.unwrap();

    assert_eq!(
        client
            .send(&to_cmd_line(&["RENAME", key_a.as_str(), key_b.as_str()]))
            .await
            .unwrap(),
        Frame::Error("ERR rename must be within one peer".into())
    );
    assert_eq!(client.get(key_a).await.unwrap().unwrap(), "v");
    assert_eq!(client.get(key_b).await.unwrap(), None);
}
