use crate::*;

use lanchat_services::Role;

#[tokio::test]
async fn first_node_hosts_and_second_joins() -> Result<()> {
    let port = free_port();

    let mut alice = spawn_hub("alice", port);
    alice.wait_state(LifecycleState::Hub).await?;
    alice.expect_admin("Scanning for hosts").await?;
    alice
        .expect_admin(&format!("No host found; starting server at 0.0.0.0:{port} ..."))
        .await?;

    let mut bob = spawn_peer("bob", port);
    bob.wait_state(LifecycleState::Peer).await?;
    bob.expect_admin(&format!("Found host at 127.0.0.1:{port}; connecting..."))
        .await?;

    alice.expect_admin("user \"bob\" connected").await?;
    bob.expect_admin("user \"alice\" connected").await?;

    assert_eq!(alice.node.role(), Role::Hub);
    assert_eq!(bob.node.role(), Role::Peer);
    assert_eq!(alice.node.registry().len(), 1);
    assert_eq!(bob.node.registry().len(), 1);

    bob.stop().await?;
    alice.stop().await
}

#[tokio::test]
async fn lone_localhost_node_becomes_hub() -> Result<()> {
    let mut solo = spawn_peer("solo", free_port());
    solo.wait_state(LifecycleState::Hub).await?;
    assert_eq!(solo.node.role(), Role::Hub);
    solo.stop().await
}

#[tokio::test]
async fn later_peers_are_announced_to_earlier_ones() -> Result<()> {
    let (alice, bob, carol) = three_node_network(free_port()).await?;

    let mut names: Vec<String> = alice
        .node
        .registry()
        .peers()
        .into_iter()
        .map(|p| p.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["bob", "carol"]);

    carol.stop().await?;
    bob.stop().await?;
    alice.stop().await
}

#[tokio::test]
async fn info_lists_everyone_the_hub_knows() -> Result<()> {
    let (mut alice, bob, carol) = three_node_network(free_port()).await?;

    alice.say(":info").await?;
    let info = alice
        .expect_ui(|p| p.message.starts_with("Connected users:"))
        .await?;
    assert_eq!(info.message, "Connected users:\n- alice (you)\n- bob\n- carol");

    carol.stop().await?;
    bob.stop().await?;
    alice.stop().await
}
