use crate::*;

use lanchat_core::UiPacketType;

#[tokio::test]
async fn chat_from_a_peer_reaches_hub_and_other_peer() -> Result<()> {
    let (mut alice, mut bob, mut carol) = three_node_network(free_port()).await?;

    bob.say("hello everyone").await?;

    let at_hub = alice.expect_ui(|p| p.kind == UiPacketType::Chat).await?;
    assert_eq!(at_hub, UiPacket::chat("bob", "hello everyone"));

    let at_carol = carol.expect_ui(|p| p.kind == UiPacketType::Chat).await?;
    assert_eq!(at_carol, UiPacket::chat("bob", "hello everyone"));

    // The sender never gets its own message back.
    alice.say("from the hub").await?;
    let at_bob = bob.expect_ui(|p| p.kind == UiPacketType::Chat).await?;
    assert_eq!(at_bob, UiPacket::chat("alice", "from the hub"));

    carol.stop().await?;
    bob.stop().await?;
    alice.stop().await
}

#[tokio::test]
async fn rename_is_announced_across_the_network() -> Result<()> {
    let (mut alice, mut bob, mut carol) = three_node_network(free_port()).await?;

    bob.say(":id robert").await?;

    let echo = bob.expect_ui(|p| p.kind == UiPacketType::Cmd).await?;
    assert_eq!(echo.message, ":id robert");

    let notice = "user \"bob\" changed their name to \"robert\"";
    alice.expect_admin(notice).await?;
    carol.expect_admin(notice).await?;
    assert_eq!(bob.node.name(), "robert");

    // Chat now carries the new name.
    bob.say("still me").await?;
    let at_carol = carol.expect_ui(|p| p.kind == UiPacketType::Chat).await?;
    assert_eq!(at_carol, UiPacket::chat("robert", "still me"));

    carol.stop().await?;
    bob.stop().await?;
    alice.stop().await
}

#[tokio::test]
async fn bad_commands_stay_local() -> Result<()> {
    let (mut alice, mut bob, carol) = three_node_network(free_port()).await?;

    bob.say(":fake_cmd").await?;
    bob.expect_admin("invalid command ':fake_cmd'. Run ':help' to see available commands")
        .await?;

    bob.say(":id").await?;
    let warning = bob
        .expect_ui(|p| p.message.starts_with(":id needs a single, non-empty argument"))
        .await?;
    assert_eq!(warning.kind, UiPacketType::Admin);
    assert_eq!(bob.node.name(), "bob");

    // The hub saw neither; the next thing it shows is this chat.
    bob.say("after the mistakes").await?;
    let next = alice.expect_ui(|_| true).await?;
    assert_eq!(next, UiPacket::chat("bob", "after the mistakes"));

    carol.stop().await?;
    bob.stop().await?;
    alice.stop().await
}
